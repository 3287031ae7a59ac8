use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use strum::Display as StrumDisplay;

use ccc_data::{ComplexType, ComplexTypeProject, DimensionSpec, GroupingSpec};

use crate::config::RoleOptions;
use crate::error::CccVisualError;
use crate::role::{RoleBinding, VisualRole};
use crate::role_list::VisualRoleList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum BinderPhase {
    New,
    InitFinished,
    DimensionsFinished,
    Bound,
}

/// What initialization or defaulting decided for one role
enum RoleAction {
    Source(String),
    PreBind(Option<Arc<GroupingSpec>>),
    Keep,
}

/// Where a chain of sourced roles ends
enum ChainEnd {
    Grouping(Option<Arc<GroupingSpec>>),
    Unresolved,
}

/// Resolves the bindings of a chart's visual roles in three phases:
///
/// 1. [`init`](Self::init) reads the role options before the source's
///    dimensions are known,
/// 2. [`dimensions_finished`](Self::dimensions_finished) applies role defaults
///    once the translator has declared its dimensions,
/// 3. [`bind`](Self::bind) validates and binds every grouping against the
///    concrete complex type.
///
/// Roles are processed in declaration order.
#[derive(Debug, Clone)]
pub struct VisualRolesBinder {
    roles: VisualRoleList,
    options: RoleOptions,
    phase: BinderPhase,
}

impl VisualRolesBinder {
    pub fn new(roles: VisualRoleList, options: RoleOptions) -> Self {
        Self {
            roles,
            options,
            phase: BinderPhase::New,
        }
    }

    pub fn phase(&self) -> BinderPhase {
        self.phase
    }

    pub fn roles(&self) -> &VisualRoleList {
        &self.roles
    }

    pub fn into_roles(self) -> VisualRoleList {
        self.roles
    }

    fn require_phase(&self, expected: BinderPhase) -> Result<(), CccVisualError> {
        if self.phase != expected {
            return Err(CccVisualError::BinderPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Apply the role options: sourcing, explicit groupings and explicit null
    /// groupings. Pending dimensions are declared in `project` for every
    /// configured dimension.
    pub fn init(&mut self, project: &mut ComplexTypeProject) -> Result<(), CccVisualError> {
        self.require_phase(BinderPhase::New)?;

        for name in self.roles.names() {
            let role = self.roles.require(&name)?;
            let action = self.init_action(role)?;
            let reversed = self.options.get(&name).and_then(|c| c.is_reversed);

            let role = self.roles.require_mut(&name)?;
            if let Some(is_reversed) = reversed {
                role.set_reversed(is_reversed);
            }
            match action {
                RoleAction::Source(source) => {
                    log::debug!("role `{name}` is sourced from `{source}`");
                    role.set_source_role(&source)?;
                }
                RoleAction::PreBind(grouping) => {
                    log::debug!(
                        "role `{name}` pre-bound to {:?}",
                        grouping.as_ref().map(|g| g.key())
                    );
                    role.pre_bind(grouping)?;
                }
                RoleAction::Keep => {}
            }
        }

        self.resolve_sourced(false)?;
        self.declare_dimensions(project);
        self.phase = BinderPhase::InitFinished;
        Ok(())
    }

    fn init_action(&self, role: &VisualRole) -> Result<RoleAction, CccVisualError> {
        let plot = role.def().plot.as_deref();
        let Some(config) = self.options.get(role.qualified_name()) else {
            // Unconfigured secondary roles alias the main plot role of the same name
            return Ok(match self.roles.primary_of(role) {
                Some(primary) => RoleAction::Source(primary.qualified_name().to_string()),
                None => RoleAction::Keep,
            });
        };

        if let Some(from) = &config.from {
            let source = self
                .roles
                .resolve(from, plot)
                .ok_or_else(|| CccVisualError::UnknownRole(from.clone()))?;
            return Ok(RoleAction::Source(source.qualified_name().to_string()));
        }
        match &config.dimensions {
            Some(Some(dimensions)) => Ok(RoleAction::PreBind(dimensions.to_grouping()?)),
            Some(None) => Ok(RoleAction::PreBind(None)),
            None => Ok(match self.roles.primary_of(role) {
                Some(primary) => RoleAction::Source(primary.qualified_name().to_string()),
                None => RoleAction::Keep,
            }),
        }
    }

    /// Pre-bind sourced roles whose source chain ends in a pre-bound role.
    ///
    /// On the final pass, roles whose chain ends unbound are declined, or fail
    /// when required.
    fn resolve_sourced(&mut self, final_pass: bool) -> Result<(), CccVisualError> {
        for name in self.roles.names() {
            let role = self.roles.require(&name)?;
            if !role.is_sourced() {
                continue;
            }
            let is_required = role.def().is_required;
            let end = self.follow_source_chain(role)?;

            let role = self.roles.require_mut(&name)?;
            match end {
                ChainEnd::Grouping(grouping) => {
                    log::debug!(
                        "sourced role `{name}` resolved to {:?}",
                        grouping.as_ref().map(|g| g.key())
                    );
                    role.pre_bind(grouping)?;
                }
                ChainEnd::Unresolved if final_pass => {
                    if is_required {
                        return Err(CccVisualError::RequiredRoleUnbound(name));
                    }
                    log::debug!("sourced role `{name}` has no bound source");
                    role.decline();
                }
                ChainEnd::Unresolved => {}
            }
        }
        Ok(())
    }

    fn follow_source_chain(&self, role: &VisualRole) -> Result<ChainEnd, CccVisualError> {
        let mut visited = HashSet::from([role.qualified_name().to_string()]);
        let mut chain = vec![role.qualified_name().to_string()];
        let mut current = role.source_role().map(|s| s.to_string());

        while let Some(name) = current {
            chain.push(name.clone());
            if !visited.insert(name.clone()) {
                return Err(CccVisualError::CyclicRoleSource(chain.join(" -> ")));
            }
            let source = self.roles.require(&name)?;
            current = match source.binding() {
                RoleBinding::PreBound(grouping) => return Ok(ChainEnd::Grouping(grouping.clone())),
                RoleBinding::Bound(grouping) => {
                    return Ok(ChainEnd::Grouping(Some(grouping.clone())))
                }
                RoleBinding::Sourced => source.source_role().map(|s| s.to_string()),
                RoleBinding::Unbound | RoleBinding::Declined => None,
            };
        }
        Ok(ChainEnd::Unresolved)
    }

    /// Declare a pending definition for every pre-bound dimension. A dimension
    /// bound by exactly one role receives that role's dimension defaults.
    fn declare_dimensions(&self, project: &mut ComplexTypeProject) {
        let mut owners: IndexMap<String, Vec<&VisualRole>> = IndexMap::new();
        for role in self.roles.iter().filter(|r| r.source_role().is_none()) {
            for dim_name in role.dimension_names() {
                owners.entry(dim_name.to_string()).or_default().push(role);
            }
        }
        for (dim_name, roles) in owners {
            match roles.as_slice() {
                [role] => project.set_dim_defaults(&dim_name, &role.def().dimension_defaults),
                _ => project.ensure_dim(&dim_name),
            }
        }
    }

    /// Bind every role left unbound by the options to its default dimension,
    /// auto-creating it when allowed, or to its default source role.
    pub fn dimensions_finished(
        &mut self,
        project: &mut ComplexTypeProject,
    ) -> Result<(), CccVisualError> {
        self.require_phase(BinderPhase::InitFinished)?;

        for name in self.roles.names() {
            let role = self.roles.require(&name)?;
            if !matches!(role.binding(), RoleBinding::Unbound) {
                continue;
            }
            let is_required = role.def().is_required;
            let defaults = role.def().dimension_defaults.clone();
            let action = match self.default_dimension_action(role, project)? {
                RoleAction::Keep => self.default_source_action(role),
                action => action,
            };

            let role = self.roles.require_mut(&name)?;
            match action {
                RoleAction::PreBind(grouping) => {
                    if let Some(grouping) = &grouping {
                        for dim_name in grouping.dimension_names() {
                            project.set_dim_defaults(dim_name, &defaults);
                        }
                    }
                    log::debug!(
                        "role `{name}` bound to its default {:?}",
                        grouping.as_ref().map(|g| g.key())
                    );
                    role.pre_bind(grouping)?;
                }
                RoleAction::Source(source) => {
                    log::debug!("role `{name}` is sourced from its default `{source}`");
                    role.set_source_role(&source)?;
                }
                RoleAction::Keep if is_required => {
                    return Err(CccVisualError::RequiredRoleUnbound(name));
                }
                RoleAction::Keep => {
                    log::debug!("optional role `{name}` left unbound");
                    role.decline();
                }
            }
        }

        self.resolve_sourced(true)?;
        self.phase = BinderPhase::DimensionsFinished;
        Ok(())
    }

    fn default_dimension_action(
        &self,
        role: &VisualRole,
        project: &mut ComplexTypeProject,
    ) -> Result<RoleAction, CccVisualError> {
        let Some(default_dimension) = &role.def().default_dimension else {
            return Ok(RoleAction::Keep);
        };
        let auto_create = role.def().auto_create_dimension;

        let dim_names = match default_dimension.strip_suffix('*') {
            Some(group) => match project.dimension_group_names(group) {
                names if !names.is_empty() => names,
                _ if auto_create => vec![self.auto_create(role, group, project)],
                _ => return Ok(RoleAction::Keep),
            },
            None if project.has_dim(default_dimension) => vec![default_dimension.clone()],
            None if auto_create => vec![self.auto_create(role, default_dimension, project)],
            None => return Ok(RoleAction::Keep),
        };
        let grouping = GroupingSpec::parse(&dim_names.join(","))?;
        Ok(RoleAction::PreBind(Some(Arc::new(grouping))))
    }

    fn auto_create(
        &self,
        role: &VisualRole,
        dim_name: &str,
        project: &mut ComplexTypeProject,
    ) -> String {
        log::info!(
            "auto-creating hidden dimension `{dim_name}` for role `{}`",
            role.qualified_name()
        );
        project.set_dim(dim_name, DimensionSpec::new().hidden(true));
        dim_name.to_string()
    }

    fn default_source_action(&self, role: &VisualRole) -> RoleAction {
        role.def()
            .default_source_role
            .as_deref()
            .and_then(|source| self.roles.resolve(source, role.def().plot.as_deref()))
            .filter(|source| source.qualified_name() != role.qualified_name())
            .map(|source| RoleAction::Source(source.qualified_name().to_string()))
            .unwrap_or(RoleAction::Keep)
    }

    /// Validate and bind every pre-bound role against `complex_type`.
    ///
    /// Roles pre-bound to the explicit null grouping are declined. Continuous
    /// dimensions of roles requiring discreteness are coerced in `complex_type`.
    pub fn bind(&mut self, complex_type: &mut ComplexType) -> Result<(), CccVisualError> {
        self.require_phase(BinderPhase::DimensionsFinished)?;

        for name in self.roles.names() {
            let role = self.roles.require_mut(&name)?;
            let is_required = role.def().is_required;
            match role.binding().clone() {
                RoleBinding::PreBound(None) | RoleBinding::Declined if is_required => {
                    return Err(CccVisualError::RequiredRoleUnbound(name));
                }
                RoleBinding::PreBound(_) => role.commit(complex_type)?,
                RoleBinding::Unbound | RoleBinding::Sourced if is_required => {
                    return Err(CccVisualError::RequiredRoleUnbound(name));
                }
                RoleBinding::Unbound | RoleBinding::Sourced => role.decline(),
                RoleBinding::Bound(_) | RoleBinding::Declined => {}
            }
        }
        self.phase = BinderPhase::Bound;
        Ok(())
    }
}
