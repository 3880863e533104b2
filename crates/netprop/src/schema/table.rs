use std::sync::{Arc, OnceLock};

use super::{FlattenedSchema, SchemaError, SendProp, flatten};

#[derive(Debug)]
pub struct SendTable {
    name: Option<String>,
    props: Vec<Arc<SendProp>>,
    flattened: OnceLock<FlattenedSchema>,
}

impl SendTable {
    pub fn new(name: impl Into<String>, props: Vec<SendProp>) -> Self {
        Self::build(Some(name.into()), props)
    }

    /// A table that can only be embedded in other tables; it cannot be registered
    /// or targeted by an exclusion.
    pub fn anonymous(props: Vec<SendProp>) -> Self {
        Self::build(None, props)
    }

    fn build(name: Option<String>, props: Vec<SendProp>) -> Self {
        Self {
            name,
            props: props.into_iter().map(Arc::new).collect(),
            flattened: OnceLock::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_prop(&self, index: usize) -> Option<&SendProp> {
        self.props.get(index).map(Arc::as_ref)
    }

    pub fn num_props(&self) -> usize {
        self.props.len()
    }

    pub fn props(&self) -> impl Iterator<Item = &SendProp> {
        self.props.iter().map(Arc::as_ref)
    }

    pub(crate) fn shared_props(&self) -> &[Arc<SendProp>] {
        &self.props
    }

    /// Flattens the table on first use and caches the result. Failures are not cached.
    pub fn flatten(&self) -> Result<&FlattenedSchema, SchemaError> {
        if let Some(schema) = self.flattened.get() {
            return Ok(schema);
        }
        let schema = flatten::flatten(self)?;
        Ok(self.flattened.get_or_init(|| schema))
    }

    pub fn flattened(&self) -> Option<&FlattenedSchema> {
        self.flattened.get()
    }
}
