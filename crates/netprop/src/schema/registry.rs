use std::collections::HashMap;
use std::sync::Arc;

use super::{FlattenedSchema, SchemaError, SendTable};

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    tables: Vec<Arc<SendTable>>,
    index: HashMap<String, usize>,
}

impl SchemaRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, table: impl Into<Arc<SendTable>>) -> Result<&mut Self, SchemaError> {
        let table = table.into();
        let name = table.name().ok_or(SchemaError::UnnamedTable)?.to_owned();
        if self.index.contains_key(&name) {
            return Err(SchemaError::DuplicateTable(name));
        }
        self.index.insert(name, self.tables.len());
        self.tables.push(table);
        Ok(self)
    }

    /// Flattens every registered table. Any schema error fails the whole registry.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        for table in &self.tables {
            table.flatten()?;
        }
        log::info!("schema registry built with {} tables", self.tables.len());
        Ok(SchemaRegistry {
            tables: self.tables,
            index: self.index,
        })
    }
}

/// Immutable set of flattened tables, built once at startup and shared by reference.
#[derive(Debug)]
pub struct SchemaRegistry {
    tables: Vec<Arc<SendTable>>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SendTable>> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn flattened(&self, name: &str) -> Result<&FlattenedSchema, SchemaError> {
        self.get(name)
            .and_then(|table| table.flattened())
            .ok_or_else(|| SchemaError::UnknownTable(name.to_owned()))
    }

    pub fn signature(&self, name: &str) -> Result<u32, SchemaError> {
        self.flattened(name).map(FlattenedSchema::signature)
    }

    /// Tables in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SendTable>> {
        self.tables.iter()
    }
}
