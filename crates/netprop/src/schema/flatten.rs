//! Turns a table tree into one ordered array of leaf props.
//!
//! Leaf order is a depth-first walk of the tree with nested tables expanded in
//! place. The order, and therefore every leaf index, is part of the wire format.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    MAX_ARRAY_ELEMENTS, MAX_PROPS, PropFlags, PropType, SchemaError, SendProp, SendTable,
};

#[derive(Debug, Clone)]
pub struct FlatProp {
    index: usize,
    prop: Arc<SendProp>,
    offset: i32,
    flags: PropFlags,
}

impl FlatProp {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn prop(&self) -> &SendProp {
        &self.prop
    }

    pub fn name(&self) -> &str {
        self.prop.name()
    }

    /// Field offset with the vector-element sentinel removed.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn flags(&self) -> PropFlags {
        self.flags
    }

    pub fn is_vector_elem(&self) -> bool {
        self.flags.contains(PropFlags::VECTOR_ELEM)
    }
}

#[derive(Debug, Clone)]
pub struct FlattenedSchema {
    table_name: Option<String>,
    props: Vec<FlatProp>,
    signature: u32,
}

impl FlattenedSchema {
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlatProp> {
        self.props.get(index)
    }

    pub fn props(&self) -> &[FlatProp] {
        &self.props
    }

    /// First leaf with the given name, in flattened order.
    pub fn find(&self, name: &str) -> Option<&FlatProp> {
        self.props.iter().find(|flat| flat.name() == name)
    }

    /// CRC-32 over the ordered leaf descriptors. Endpoints compare this before
    /// exchanging entity data.
    pub fn signature(&self) -> u32 {
        self.signature
    }
}

type ExclusionSet = HashMap<(String, String), bool>;

pub(crate) fn flatten(table: &SendTable) -> Result<FlattenedSchema, SchemaError> {
    let mut excludes = ExclusionSet::new();
    let mut visited = HashSet::new();
    gather_excludes(table, &mut visited, &mut excludes);

    let mut props = Vec::new();
    flatten_table(table, &mut excludes, &mut props)?;

    let mut missing: Vec<_> = excludes
        .into_iter()
        .filter(|(_, matched)| !matched)
        .map(|(key, _)| key)
        .collect();
    missing.sort();
    if let Some((table_name, prop_name)) = missing.into_iter().next() {
        return Err(SchemaError::MissingExcludeTarget {
            table: table_name,
            prop: prop_name,
        });
    }

    let signature = compute_signature(&props);
    log::debug!(
        "flattened table '{}' into {} props (signature {:08x})",
        table.name().unwrap_or("<anonymous>"),
        props.len(),
        signature
    );

    Ok(FlattenedSchema {
        table_name: table.name().map(str::to_owned),
        props,
        signature,
    })
}

// Each table is visited once no matter how many paths reach it.
fn gather_excludes(
    table: &SendTable,
    visited: &mut HashSet<*const SendTable>,
    excludes: &mut ExclusionSet,
) {
    if !visited.insert(table as *const SendTable) {
        return;
    }

    for prop in table.props() {
        if let Some(target) = prop.exclude_target() {
            excludes
                .entry((target.table.clone(), target.prop.clone()))
                .or_insert(false);
        } else if let Some(child) = prop.data_table() {
            gather_excludes(child, visited, excludes);
        }
    }
}

fn flatten_table(
    table: &SendTable,
    excludes: &mut ExclusionSet,
    out: &mut Vec<FlatProp>,
) -> Result<(), SchemaError> {
    let table_name = table.name().unwrap_or("<anonymous>");

    for prop in table.shared_props() {
        if prop.is_exclude() {
            continue;
        }
        if let Some(name) = table.name() {
            if let Some(matched) = excludes.get_mut(&(name.to_owned(), prop.name().to_owned())) {
                *matched = true;
                continue;
            }
        }

        validate(table_name, prop)?;

        if prop.prop_type() == PropType::Table {
            if let Some(child) = prop.data_table() {
                flatten_table(child, excludes, out)?;
            }
            continue;
        }

        if out.len() >= MAX_PROPS {
            return Err(SchemaError::TooManyProps {
                table: table_name.to_owned(),
                max: MAX_PROPS,
            });
        }

        let mut flags = prop.flags();
        let mut offset = prop.offset();
        if offset < 0 {
            offset = -offset;
            flags |= PropFlags::VECTOR_ELEM;
        }

        out.push(FlatProp {
            index: out.len(),
            prop: Arc::clone(prop),
            offset,
            flags,
        });
    }

    Ok(())
}

fn invalid(table: &str, prop: &SendProp, reason: &'static str) -> SchemaError {
    SchemaError::InvalidProp {
        table: table.to_owned(),
        prop: prop.name().to_owned(),
        reason,
    }
}

fn validate(table: &str, prop: &SendProp) -> Result<(), SchemaError> {
    // A negative offset is stored as its magnitude.
    if prop.offset() == i32::MIN {
        return Err(invalid(table, prop, "offset out of range"));
    }
    let flags = prop.flags();
    match prop.prop_type() {
        PropType::Int => {
            if !flags.contains(PropFlags::VARINT) && !(1..=32).contains(&prop.bits()) {
                return Err(invalid(table, prop, "int width must be 1..=32 bits"));
            }
            if prop.bits() == 1 && !flags.intersects(PropFlags::UNSIGNED | PropFlags::VARINT) {
                log::warn!(
                    "prop '{}' in table '{}' is a signed 1-bit int; it can only carry 0 and -1, mark it UNSIGNED",
                    prop.name(),
                    table
                );
            }
        }
        PropType::Float | PropType::Vector | PropType::VectorXY => {
            if (flags & PropFlags::FLOAT_ENCODINGS).bits().count_ones() > 1 {
                return Err(invalid(table, prop, "float encodings are mutually exclusive"));
            }
            if !flags.intersects(PropFlags::FLOAT_ENCODINGS) {
                if !(1..32).contains(&prop.bits()) {
                    return Err(invalid(table, prop, "ranged float width must be 1..=31 bits"));
                }
                if prop.low().partial_cmp(&prop.high()) != Some(Ordering::Less) {
                    return Err(invalid(table, prop, "ranged float needs low < high"));
                }
            }
        }
        PropType::String => {}
        PropType::Array => {
            let Some(element) = prop.array_element() else {
                return Err(invalid(table, prop, "array has no element descriptor"));
            };
            match element.prop_type() {
                PropType::Table => {
                    return Err(SchemaError::ArrayOfTable {
                        table: table.to_owned(),
                        prop: prop.name().to_owned(),
                    });
                }
                PropType::Array => {
                    return Err(invalid(table, prop, "nested arrays are not supported"));
                }
                _ => validate(table, element)?,
            }
            if !(1..=MAX_ARRAY_ELEMENTS).contains(&prop.max_elements()) {
                return Err(invalid(table, prop, "array size must be 1..=2048 elements"));
            }
        }
        PropType::Table => {
            if prop.data_table().is_none() {
                return Err(invalid(table, prop, "table prop has no table"));
            }
        }
    }
    Ok(())
}

fn hash_prop(hasher: &mut crc32fast::Hasher, prop: &SendProp) {
    hasher.update(prop.name().as_bytes());
    hasher.update(&[0, prop.prop_type() as u8]);
    hasher.update(&prop.bits().to_le_bytes());
    hasher.update(&(prop.flags() - PropFlags::VECTOR_ELEM).bits().to_le_bytes());
    hasher.update(&prop.low().to_bits().to_le_bytes());
    hasher.update(&prop.high().to_bits().to_le_bytes());
    if let Some(element) = prop.array_element() {
        hasher.update(&prop.max_elements().to_le_bytes());
        hash_prop(hasher, element);
    }
}

fn compute_signature(props: &[FlatProp]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&(props.len() as u32).to_le_bytes());
    for flat in props {
        hash_prop(&mut hasher, flat.prop());
    }
    hasher.finalize()
}
