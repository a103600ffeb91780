use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChoroplethError {
    #[error("failed to load {resource}: {reason}")]
    ResourceLoad { resource: String, reason: String },

    #[error("attribute '{attribute}' missing from district '{district}'")]
    MissingAttribute { district: String, attribute: String },

    #[error("'{0}' is a reserved column and cannot be mapped")]
    ReservedAttribute(String),

    #[error("district '{district}' has a zero total")]
    DivisionByZero { district: String },

    #[error("degenerate colour domain [{min}, {max}]")]
    DegenerateDomain { min: f64, max: f64 },

    #[error("not a number: '{value}'")]
    Parse { value: String },

    #[error("dataset has no usable records")]
    EmptyDataset,

    #[error("palette needs at least two colours, got {0}")]
    InvalidPalette(usize),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    #[error("unknown district '{0}'")]
    UnknownDistrict(String),

    #[error("no demographic category is selected")]
    NoDemographicLayer,
}

pub type Result<T> = std::result::Result<T, ChoroplethError>;
