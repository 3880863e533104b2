use std::cmp::Ordering;

use super::{DeltaError, DeltaReader, DeltaWriter, lookup};
use crate::bits::{BitWriter, PackedBits};
use crate::schema::{FlattenedSchema, MAX_PROPS};

/// Which side of a merge-join the next prop comes from.
#[derive(Debug, Clone, Copy)]
enum Step {
    Old(usize),
    New(usize),
    Both(usize),
}

fn next_step(old: Option<usize>, new: Option<usize>) -> Option<Step> {
    match (old, new) {
        (None, None) => None,
        (Some(o), None) => Some(Step::Old(o)),
        (None, Some(n)) => Some(Step::New(n)),
        (Some(o), Some(n)) => Some(match o.cmp(&n) {
            Ordering::Less => Step::Old(o),
            Ordering::Greater => Step::New(n),
            Ordering::Equal => Step::Both(o),
        }),
    }
}

fn push_changed(changed: &mut Vec<usize>, index: usize) -> Result<(), DeltaError> {
    if changed.len() >= MAX_PROPS {
        return Err(DeltaError::TooManyChanges {
            count: changed.len() + 1,
            max: MAX_PROPS,
        });
    }
    changed.push(index);
    Ok(())
}

/// Sorted indices of props that are only in `to` or whose encoding differs from `from`.
pub fn calc_delta(
    schema: &FlattenedSchema,
    mut from: DeltaReader<'_>,
    mut to: DeltaReader<'_>,
) -> Result<Vec<usize>, DeltaError> {
    let mut changed = Vec::new();
    let mut old = from.next_prop_index()?;
    let mut new = to.next_prop_index()?;

    // Props left only in `from` can't change anything, so stop when `to` runs out.
    while let Some(step) = next_step(old, new) {
        if new.is_none() {
            break;
        }
        match step {
            Step::Old(index) => {
                from.skip_prop_data(lookup(schema, index)?)?;
                old = from.next_prop_index()?;
            }
            Step::New(index) => {
                to.skip_prop_data(lookup(schema, index)?)?;
                push_changed(&mut changed, index)?;
                new = to.next_prop_index()?;
            }
            Step::Both(index) => {
                if from.compare_prop_data(&mut to, lookup(schema, index)?)? {
                    push_changed(&mut changed, index)?;
                }
                old = from.next_prop_index()?;
                new = to.next_prop_index()?;
            }
        }
    }
    Ok(changed)
}

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub bits: PackedBits,
    /// Props taken from the new stream that differ from the old one.
    pub changed: Vec<usize>,
}

/// Merges `new` over `old` into `out`, returning the changed indices.
pub fn merge_deltas_into(
    schema: &FlattenedSchema,
    mut old: DeltaReader<'_>,
    mut new: DeltaReader<'_>,
    out: &mut BitWriter,
) -> Result<Vec<usize>, DeltaError> {
    let mut changed = Vec::new();
    let mut writer = DeltaWriter::new(out);
    let mut old_index = old.next_prop_index()?;
    let mut new_index = new.next_prop_index()?;

    while let Some(step) = next_step(old_index, new_index) {
        match step {
            Step::Old(index) => {
                writer.copy_prop(lookup(schema, index)?, &mut old)?;
                old_index = old.next_prop_index()?;
            }
            Step::New(index) => {
                writer.copy_prop(lookup(schema, index)?, &mut new)?;
                push_changed(&mut changed, index)?;
                new_index = new.next_prop_index()?;
            }
            Step::Both(index) => {
                let prop = lookup(schema, index)?;
                let mut lookahead = new.clone();
                let differs = old.compare_prop_data(&mut lookahead, prop)?;
                writer.copy_prop(prop, &mut new)?;
                if differs {
                    push_changed(&mut changed, index)?;
                }
                old_index = old.next_prop_index()?;
                new_index = new.next_prop_index()?;
            }
        }
    }

    writer.finish()?;
    Ok(changed)
}

pub fn merge_deltas(
    schema: &FlattenedSchema,
    old: DeltaReader<'_>,
    new: DeltaReader<'_>,
) -> Result<MergeOutput, DeltaError> {
    // Relative index codes can grow when streams interleave; 16 bits covers the worst code.
    let capacity = old.remaining_bits() + new.remaining_bits() + 16 * schema.len() + 1;
    let mut out = BitWriter::with_capacity_bits(capacity);
    let changed = merge_deltas_into(schema, old, new, &mut out)?;
    Ok(MergeOutput {
        bits: out.finish(),
        changed,
    })
}

/// Writes a stream carrying only `indices`, copied verbatim from `data`.
///
/// `indices` must be strictly increasing. Indices absent from `data` are skipped.
pub fn write_prop_list(
    schema: &FlattenedSchema,
    mut data: DeltaReader<'_>,
    indices: &[usize],
    out: &mut BitWriter,
) -> Result<(), DeltaError> {
    if let Some(pair) = indices.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(DeltaError::IndexOrder {
            previous: pair[0] as i32,
            index: pair[1],
        });
    }

    let mut writer = DeltaWriter::new(out);
    let mut wanted = indices.iter().copied().peekable();
    while let Some(index) = data.next_prop_index()? {
        let prop = lookup(schema, index)?;
        while wanted.next_if(|&w| w < index).is_some() {}
        if wanted.next_if_eq(&index).is_some() {
            writer.copy_prop(prop, &mut data)?;
        } else {
            data.skip_prop_data(prop)?;
        }
        if wanted.peek().is_none() {
            break;
        }
    }
    writer.finish()?;
    Ok(())
}

/// Relays the props of `data` whose encoding is not the type's zero value.
///
/// A receiver starting from zeroed state ends up with the same values as if it
/// had decoded all of `data`. Returns the indices written.
pub fn write_against_zero(
    schema: &FlattenedSchema,
    mut data: DeltaReader<'_>,
    out: &mut BitWriter,
) -> Result<Vec<usize>, DeltaError> {
    let mut written = Vec::new();
    let mut writer = DeltaWriter::new(out);
    while let Some(index) = data.next_prop_index()? {
        let prop = lookup(schema, index)?;
        if data.clone().is_prop_zero(prop)? {
            data.skip_prop_data(prop)?;
        } else {
            writer.copy_prop(prop, &mut data)?;
            written.push(index);
        }
    }
    writer.finish()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PropValue;
    use crate::delta::{decode_entity, encode_entity};
    use crate::schema::{PropFlags, SendProp, SendTable};

    fn table() -> SendTable {
        SendTable::new(
            "Turret",
            vec![
                SendProp::int("ammo", 8, PropFlags::UNSIGNED),
                SendProp::float("yaw", 10, 0.0, 360.0, PropFlags::empty()),
                SendProp::int("team", 2, PropFlags::UNSIGNED),
                SendProp::string("owner"),
            ],
        )
    }

    fn encode(schema: &FlattenedSchema, values: &[PropValue]) -> PackedBits {
        let mut writer = BitWriter::with_capacity_bytes(128);
        encode_entity(schema, values, &mut writer).unwrap();
        writer.finish()
    }

    fn state(ammo: i64, yaw: f32, team: i64, owner: &str) -> Vec<PropValue> {
        vec![ammo.into(), yaw.into(), team.into(), owner.into()]
    }

    #[test]
    fn calc_delta_finds_changes() {
        let table = table();
        let schema = table.flatten().unwrap();
        let a = encode(schema, &state(50, 90.0, 1, "red"));
        let b = encode(schema, &state(49, 90.0, 1, "blue"));

        let changed =
            calc_delta(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&b)).unwrap();
        assert_eq!(changed, vec![0, 3]);
    }

    #[test]
    fn self_merge_changes_nothing() {
        let table = table();
        let schema = table.flatten().unwrap();
        let a = encode(schema, &state(50, 90.0, 1, "red"));

        let merged =
            merge_deltas(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&a)).unwrap();
        assert!(merged.changed.is_empty());
        assert_eq!(merged.bits, a);
    }

    #[test]
    fn merging_a_partial_delta_reproduces_target() {
        let table = table();
        let schema = table.flatten().unwrap();
        let a = encode(schema, &state(50, 90.0, 1, "red"));
        let b = encode(schema, &state(50, 180.0, 2, "red"));

        let changed =
            calc_delta(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&b)).unwrap();
        assert_eq!(changed, vec![1, 2]);

        let mut delta = BitWriter::with_capacity_bytes(64);
        write_prop_list(schema, DeltaReader::from_bits(&b), &changed, &mut delta).unwrap();
        let delta = delta.finish();

        let merged = merge_deltas(
            schema,
            DeltaReader::from_bits(&a),
            DeltaReader::from_bits(&delta),
        )
        .unwrap();
        assert_eq!(merged.changed, vec![1, 2]);
        assert_eq!(merged.bits, b);
    }

    #[test]
    fn new_only_props_are_changed() {
        let table = table();
        let schema = table.flatten().unwrap();
        let empty = {
            let mut writer = BitWriter::with_capacity_bytes(1);
            DeltaWriter::new(&mut writer).finish().unwrap();
            writer.finish()
        };
        let b = encode(schema, &state(1, 0.0, 0, ""));

        let merged = merge_deltas(
            schema,
            DeltaReader::from_bits(&empty),
            DeltaReader::from_bits(&b),
        )
        .unwrap();
        assert_eq!(merged.changed, vec![0, 1, 2, 3]);
        assert_eq!(merged.bits, b);
    }

    #[test]
    fn against_zero_drops_zero_props() {
        let table = table();
        let schema = table.flatten().unwrap();
        let full = encode(schema, &state(7, 0.0, 0, "blue"));

        let mut out = BitWriter::with_capacity_bytes(64);
        let written =
            write_against_zero(schema, DeltaReader::from_bits(&full), &mut out).unwrap();
        assert_eq!(written, vec![0, 3]);

        let bits = out.finish();
        let decoded = decode_entity(schema, DeltaReader::from_bits(&bits)).unwrap();
        assert_eq!(decoded, state(7, 0.0, 0, "blue"));
    }

    #[test]
    fn against_zero_keeps_negative_zero() {
        let table = SendTable::new(
            "Timer",
            vec![
                SendProp::float("remaining", 0, 0.0, 0.0, PropFlags::NO_SCALE),
                SendProp::vector("drift", 0, 0.0, 0.0, PropFlags::NO_SCALE),
            ],
        );
        let schema = table.flatten().unwrap();
        let values = vec![
            PropValue::Float(-0.0),
            PropValue::Vector(glam::Vec3::new(0.0, 0.0, -0.0)),
        ];
        let full = encode(schema, &values);

        let mut out = BitWriter::with_capacity_bytes(64);
        let written =
            write_against_zero(schema, DeltaReader::from_bits(&full), &mut out).unwrap();
        assert_eq!(written, vec![0, 1]);

        let bits = out.finish();
        let decoded = decode_entity(schema, DeltaReader::from_bits(&bits)).unwrap();
        assert_eq!(decoded[0].as_float().unwrap().to_bits(), 0x8000_0000);
        assert_eq!(decoded[1].as_vector().unwrap().z.to_bits(), 0x8000_0000);
    }

    #[test]
    fn prop_list_must_be_sorted() {
        let table = table();
        let schema = table.flatten().unwrap();
        let full = encode(schema, &state(7, 0.0, 0, "blue"));
        let mut out = BitWriter::with_capacity_bytes(64);
        assert!(matches!(
            write_prop_list(schema, DeltaReader::from_bits(&full), &[3, 1], &mut out),
            Err(DeltaError::IndexOrder { .. })
        ));
    }
}
