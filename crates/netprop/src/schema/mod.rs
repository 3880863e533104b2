mod flatten;
mod prop;
mod registry;
mod table;

pub use flatten::{FlatProp, FlattenedSchema};
pub use prop::{ExcludeTarget, FloatEncoding, PropFlags, PropType, SendProp};
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
pub use table::SendTable;

/// Upper bound on leaves in one flattened schema. Property indices are sent
/// with at most 12 magnitude bits, so this is also a wire limit.
pub const MAX_PROPS: usize = 4096;

pub const MAX_ARRAY_ELEMENTS: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("table '{0}' is already registered")]
    DuplicateTable(String),
    #[error("only named tables can be registered")]
    UnnamedTable,
    #[error("table '{0}' is not registered")]
    UnknownTable(String),
    #[error("array '{prop}' in table '{table}' has a table element, which cannot be sent")]
    ArrayOfTable { table: String, prop: String },
    #[error("exclusion of '{table}.{prop}' matches no property")]
    MissingExcludeTarget { table: String, prop: String },
    #[error("table '{table}' flattens to more than {max} properties")]
    TooManyProps { table: String, max: usize },
    #[error("invalid prop '{prop}' in table '{table}': {reason}")]
    InvalidProp {
        table: String,
        prop: String,
        reason: &'static str,
    },
}
