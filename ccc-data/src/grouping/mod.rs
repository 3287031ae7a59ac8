mod engine;
mod oper;
mod spec;

pub(crate) use engine::{level_key, FlatState};
pub use oper::{GroupingOper, GroupingOptions};
pub use spec::{
    EnsureOptions, FlattenMode, GroupingDimensionSpec, GroupingLevelSpec, GroupingSpec,
};
