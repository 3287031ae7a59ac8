use crate::data::DataId;
use crate::datum::DatumId;
use crate::value::ValueType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CccDataError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Dimension not found: `{0}`")]
    UnknownDimension(String),

    #[error("Dimension already defined: `{0}`")]
    DuplicateDimension(String),

    #[error("Cannot cast `{value}` to {value_type} for dimension `{dimension}`")]
    ValueCast {
        dimension: String,
        value: String,
        value_type: ValueType,
    },

    #[error("Atom of dimension `{atom_dimension}` cannot be used for dimension `{dimension}`")]
    ForeignAtom {
        dimension: String,
        atom_dimension: String,
    },

    #[error("Invalid grouping specification `{text}`: {reason}")]
    GroupingParse { text: String, reason: String },

    #[error("Grouping is bound to complex type {grouping_type} but the data has complex type {data_type}")]
    SchemaMismatch { grouping_type: u64, data_type: u64 },

    #[error("Data {0} does not exist or was disposed")]
    DataDisposed(DataId),

    #[error("Datum {0} not found")]
    DatumNotFound(DatumId),

    #[error("No data")]
    NoData,
}

impl CccDataError {
    /// The "no data" condition is recoverable: callers are expected to render a placeholder.
    pub fn is_no_data(&self) -> bool {
        matches!(self, CccDataError::NoData)
    }
}
