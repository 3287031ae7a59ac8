pub mod atom;
pub mod complex_type;
pub mod complex_type_project;
pub mod data;
pub mod datum;
pub mod dimension;
pub mod error;
pub mod grouping;
pub mod interpolation;
pub mod value;

pub use atom::{Atom, AtomRef};
pub use complex_type::{ComplexType, DimensionType};
pub use complex_type_project::{ComplexTypeProject, DimensionSpec};
pub use data::{
    DataId, DataKind, DataRef, DataSet, DatumsOptions, LoadOptions, QueryClause, QuerySpec,
    WhereOptions,
};
pub use datum::{Datum, DatumId, DatumPredicate, Record, RecordValue};
pub use dimension::Dimension;
pub use error::CccDataError;
pub use grouping::{
    EnsureOptions, FlattenMode, GroupingDimensionSpec, GroupingLevelSpec, GroupingOper,
    GroupingOptions, GroupingSpec,
};
pub use interpolation::{InterpolationMode, InterpolationOptions};
pub use value::{Value, ValueType};
