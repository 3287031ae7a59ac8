use indexmap::IndexMap;

use crate::error::CccVisualError;
use crate::role::{VisualRole, VisualRoleDef};

/// The visual roles of a chart, in declaration order.
///
/// Roles of the main plot are keyed by their name, roles of other plots by
/// `plot.name` (secondary roles).
#[derive(Debug, Clone, Default)]
pub struct VisualRoleList {
    roles: IndexMap<String, VisualRole>,
}

impl VisualRoleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, def: VisualRoleDef) -> Result<&mut VisualRole, CccVisualError> {
        let name = def.qualified_name();
        if self.roles.contains_key(&name) {
            return Err(CccVisualError::InvalidArgument(format!(
                "visual role `{name}` is already declared"
            )));
        }
        Ok(self.roles.entry(name).or_insert(VisualRole::new(def)))
    }

    pub fn with_role(mut self, def: VisualRoleDef) -> Result<Self, CccVisualError> {
        self.add(def)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Look a role up by qualified name, or by local name for main plot roles
    pub fn get(&self, name: &str) -> Option<&VisualRole> {
        self.roles.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VisualRole> {
        self.roles.get_mut(name)
    }

    pub fn require(&self, name: &str) -> Result<&VisualRole, CccVisualError> {
        self.get(name)
            .ok_or_else(|| CccVisualError::UnknownRole(name.to_string()))
    }

    pub(crate) fn require_mut(&mut self, name: &str) -> Result<&mut VisualRole, CccVisualError> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| CccVisualError::UnknownRole(name.to_string()))
    }

    /// Resolve a role reference made from a role of `plot`: a local name of
    /// that plot first, then a qualified or main plot name.
    pub fn resolve(&self, name: &str, plot: Option<&str>) -> Option<&VisualRole> {
        plot.and_then(|plot| self.roles.get(&format!("{plot}.{name}")))
            .or_else(|| self.roles.get(name))
    }

    /// The main plot role a secondary role of the same name aliases
    pub fn primary_of(&self, role: &VisualRole) -> Option<&VisualRole> {
        role.def().plot.as_ref()?;
        self.roles.get(role.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisualRole> {
        self.roles.values()
    }

    /// Qualified names in declaration order
    pub fn names(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }
}
