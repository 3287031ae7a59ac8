use ccc_data::CccDataError;
use thiserror::Error;

use crate::binder::BinderPhase;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CccVisualError {
    #[error("Data error: {0}")]
    DataError(#[from] CccDataError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Visual role not found: `{0}`")]
    UnknownRole(String),

    #[error("Visual role `{0}` is already bound")]
    RoleAlreadyBound(String),

    #[error("Visual role `{0}` is not bound")]
    RoleNotBound(String),

    #[error("Required visual role `{0}` is not bound")]
    RequiredRoleUnbound(String),

    #[error("Cyclic visual role source: {0}")]
    CyclicRoleSource(String),

    #[error("Binder is in phase {actual} but the operation requires phase {expected}")]
    BinderPhase {
        expected: BinderPhase,
        actual: BinderPhase,
    },

    #[error("Cannot conciliate the data cells of axis `{axis}`: {reason}")]
    AxisConciliation { axis: String, reason: String },

    #[error("No axis constructor registered for axis type: `{0}`")]
    UnknownAxisType(String),

    #[error("Axis `{0}` is not bound")]
    AxisNotBound(String),
}
