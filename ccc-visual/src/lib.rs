pub mod axis;
pub mod binder;
pub mod config;
pub mod error;
pub mod role;
pub mod role_list;
pub mod traversal;

pub use axis::{
    Axis, AxisConciliation, AxisCore, AxisDataCell, AxisOptions, AxisOrientation, AxisRegistry,
    AxisScale, CartesianAxis, ColorAxis, GroupOperator, ScaleDomain, ScaleType,
};
pub use binder::{BinderPhase, VisualRolesBinder};
pub use config::{DimensionsOption, RoleConfig, RoleOptions};
pub use error::CccVisualError;
pub use role::{RoleBinding, RoleGroupOptions, VisualRole, VisualRoleDef};
pub use role_list::VisualRoleList;
pub use traversal::{TraversalMode, TraversalModes};
