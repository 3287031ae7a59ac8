use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use ccc_data::GroupingSpec;

use crate::error::CccVisualError;

/// The `dimensions` of a role: a grouping text or a list of level texts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionsOption {
    Text(String),
    List(Vec<String>),
}

impl DimensionsOption {
    /// The grouping spec, or `None` for an empty text or list
    pub fn to_grouping(&self) -> Result<Option<Arc<GroupingSpec>>, CccVisualError> {
        let text = match self {
            DimensionsOption::Text(text) => text.trim().to_string(),
            DimensionsOption::List(levels) => levels
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(","),
        };
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(GroupingSpec::parse(&text)?)))
    }
}

/// User configuration of one visual role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    /// Absent: not configured. `null`: deliberately unbound.
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub dimensions: Option<Option<DimensionsOption>>,
    /// Name of the role to take the grouping from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reversed: Option<bool>,
}

impl RoleConfig {
    pub fn dimensions(text: impl Into<String>) -> Self {
        Self {
            dimensions: Some(Some(DimensionsOption::Text(text.into()))),
            ..Default::default()
        }
    }

    pub fn unbound() -> Self {
        Self {
            dimensions: Some(None),
            ..Default::default()
        }
    }

    pub fn from_role(role: impl Into<String>) -> Self {
        Self {
            from: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn with_reversed(mut self, is_reversed: bool) -> Self {
        self.is_reversed = Some(is_reversed);
        self
    }
}

/// Present fields, including an explicit `null`, deserialize to `Some`
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Role configurations keyed by qualified role name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleOptions(IndexMap<String, RoleConfig>);

impl RoleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: impl Into<String>, config: RoleConfig) -> Self {
        self.0.insert(role.into(), config);
        self
    }

    pub fn get(&self, role: &str) -> Option<&RoleConfig> {
        self.0.get(role)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
