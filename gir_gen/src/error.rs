use thiserror::Error;

/// Failures while measuring aggregates. Each carries the offending node's
/// name so the diagnostic points somewhere useful.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("field '{field}' of '{aggregate}' has void type")]
    VoidField { aggregate: String, field: String },

    #[error("type '{name}' referenced from '{aggregate}' not found")]
    UnknownType { aggregate: String, name: String },

    #[error("non-pointer field '{field}' of '{aggregate}' has no inline layout (tag {tag})")]
    NoInlineLayout {
        aggregate: String,
        field: String,
        tag: &'static str,
    },

    #[error("field '{field}' of '{aggregate}' embeds a {kind} by value")]
    InvalidEmbedded {
        aggregate: String,
        field: String,
        kind: &'static str,
    },

    #[error("recursive non-pointer aggregate: {}", path.join(" -> "))]
    RecursiveAggregate { path: Vec<String> },
}

/// Failures while serializing a module.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("entry name '{0}' may not contain '.'")]
    NameContainsDot(String),

    #[error("duplicate entry name '{0}'")]
    DuplicateEntry(String),

    #[error("too many name parts in '{0}'")]
    TooManyNameParts(String),

    #[error("constant '{name}' has unparseable value '{value}'")]
    BadConstantValue { name: String, value: String },

    #[error("constant '{name}' has non-basic type")]
    NonBasicConstant { name: String },

    #[error("union '{name}' has {discriminators} discriminator values for {fields} fields")]
    DiscriminatorCount {
        name: String,
        fields: usize,
        discriminators: usize,
    },

    #[error("node '{name}' overran its reservation by {excess} bytes")]
    ReservationExceeded { name: String, excess: u32 },
}
