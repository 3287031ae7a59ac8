use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display as StrumDisplay, EnumIter, EnumString, IntoEnumIterator, VariantNames};

use ccc_data::{EnsureOptions, FlattenMode};

/// How a role's grouping is walked when its data is flattened
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    EnumIter,
    VariantNames,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum TraversalMode {
    /// One generation of children per level
    Tree = 1,
    /// All levels merged into one
    FlattenedSingleLevel = 2,
    /// All groups of every level as siblings, parents first
    FlattenDfsPre = 4,
    /// All groups of every level as siblings, parents last
    FlattenDfsPost = 8,
}

impl TraversalMode {
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// The grouping transform realizing this mode
    pub fn ensure_options(self) -> EnsureOptions {
        match self {
            TraversalMode::Tree => EnsureOptions::default(),
            TraversalMode::FlattenDfsPre => {
                EnsureOptions::default().with_flatten_mode(FlattenMode::DfsPre)
            }
            TraversalMode::FlattenDfsPost => {
                EnsureOptions::default().with_flatten_mode(FlattenMode::DfsPost)
            }
            TraversalMode::FlattenedSingleLevel => EnsureOptions::default().with_single_level(true),
        }
    }
}

bitflags::bitflags! {
    /// A set of [`TraversalMode`]s
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TraversalModes: u8 {
        const TREE = TraversalMode::Tree as u8;
        const FLATTENED_SINGLE_LEVEL = TraversalMode::FlattenedSingleLevel as u8;
        const FLATTEN_DFS_PRE = TraversalMode::FlattenDfsPre as u8;
        const FLATTEN_DFS_POST = TraversalMode::FlattenDfsPost as u8;
    }
}

impl TraversalModes {
    pub fn with(self, mode: TraversalMode) -> Self {
        self | Self::from(mode)
    }

    pub fn supports(&self, mode: TraversalMode) -> bool {
        self.contains(mode.into())
    }

    /// The numerically highest mode in the set. DFS-flattened modes win over the others.
    pub fn highest(&self) -> Option<TraversalMode> {
        TraversalMode::iter().rev().find(|m| self.supports(*m))
    }

    pub fn modes(&self) -> impl Iterator<Item = TraversalMode> + '_ {
        TraversalMode::iter().filter(|m| self.supports(*m))
    }
}

impl From<TraversalMode> for TraversalModes {
    fn from(mode: TraversalMode) -> Self {
        Self::from_bits_retain(mode.bit())
    }
}

impl FromIterator<TraversalMode> for TraversalModes {
    fn from_iter<T: IntoIterator<Item = TraversalMode>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), |modes, m| modes.with(m))
    }
}

/// Serialized as the list of mode names
impl Serialize for TraversalModes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.modes())
    }
}

impl<'de> Deserialize<'de> for TraversalModes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<TraversalMode>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}
