//! The scope algebra: entity types, scopes, `EntityScope`, and the
//! implicit-permission rules that decide whether a set of grants satisfies a
//! required scope.
//!
//! Pure and synchronous — no I/O happens in this module. Parent lookups
//! needed for hierarchy inheritance are pushed to the caller (the vending
//! machine), which resolves them through the [`crate::store::Querier`] and
//! feeds the results back in as plain arguments. Keeping the algebra itself
//! a set of free functions over plain data, rather than scattering checks
//! across call sites, is deliberate — see spec §9.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{Result, TvmError};

/// A node class in the authorization tree. `System` is the global root;
/// `User` is a separate, self-referential per-principal root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    System,
    Organization,
    Workspace,
    Resource,
    User,
}

/// A permission level. Ordering here is semantic/display-only — the algebra
/// never infers `Read` from a held `Write`, so do not derive implication
/// from `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

/// A granted or required tuple: "this scope, on this entity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EntityScope {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub scope: Scope,
}

impl EntityScope {
    pub fn new(entity_type: EntityType, entity_id: i64, scope: Scope) -> Self {
        Self { entity_type, entity_id, scope }
    }
}

/// An `(EntityType, Scope)` pair with no specific id — the shape the action
/// table is keyed on; the id is attached at check time from the action's
/// target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityTypeScope {
    pub entity_type: EntityType,
    pub scope: Scope,
}

impl EntityTypeScope {
    pub const fn new(entity_type: EntityType, scope: Scope) -> Self {
        Self { entity_type, scope }
    }

    /// Attach a concrete entity id, producing a checkable [`EntityScope`].
    pub fn at(self, entity_id: i64) -> EntityScope {
        EntityScope::new(self.entity_type, entity_id, self.scope)
    }
}

/// A persisted grant directly attached to a user. The set of these rows for
/// a user is its full set of explicit, non-inherited permissions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserScope {
    pub user_id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub scope: Scope,
}

impl UserScope {
    pub fn as_entity_scope(&self) -> EntityScope {
        EntityScope::new(self.entity_type, self.entity_id, self.scope)
    }
}

/// The parent entities a [`Resource`](EntityType::Resource) needs looked up
/// to evaluate inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceParents {
    pub workspace_id: i64,
    pub organization_id: i64,
}

/// Parent context fed into [`is_satisfied`] for the entity types that need
/// it. Workspace inheritance needs only the owning org; Resource
/// inheritance needs both its workspace and that workspace's org.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentContext {
    pub organization_id: Option<i64>,
    pub resource_parents: Option<ResourceParents>,
}

/// Decide whether `granted` satisfies `required`, applying direct hits,
/// the system override, and parent-hierarchy inheritance in that order, as
/// spec §4.1 lays out. The caller is responsible for having already
/// resolved `parents` for `required.entity_type` (see
/// [`crate::store::Querier::get_organization_id_by_workspace_id`] and
/// [`crate::store::Querier::get_workspace_organization_id_by_resource_id`]);
/// this function performs no I/O itself.
pub fn is_satisfied(
    granted: &[EntityScope],
    required: EntityScope,
    parents: ParentContext,
) -> Result<bool> {
    // Rule 1: direct hit.
    if granted.contains(&required) {
        return Ok(true);
    }

    // Rule 2: system override. A System grant at the same scope level
    // satisfies any non-system requirement, unconditional on the
    // requirement's entity type otherwise (this includes `User`, by design
    // — see DESIGN.md's record of this Open Question). A `System`
    // requirement itself is excluded: it must still match on `entity_id`
    // via rule 1, same as any other same-entity-type requirement.
    let has_system_override = required.entity_type != EntityType::System
        && granted
            .iter()
            .any(|g| g.entity_type == EntityType::System && g.scope == required.scope);
    if has_system_override {
        return Ok(true);
    }

    // Rule 3: parent inheritance, keyed on the required entity's type.
    match required.entity_type {
        EntityType::Organization | EntityType::User | EntityType::System => Ok(false),
        EntityType::Workspace => {
            let org_id = parents.organization_id.ok_or(TvmError::EntityNotFound)?;
            Ok(granted.contains(&EntityScope::new(EntityType::Organization, org_id, required.scope)))
        }
        EntityType::Resource => {
            let ResourceParents { workspace_id, organization_id } =
                parents.resource_parents.ok_or(TvmError::EntityNotFound)?;
            let via_workspace = granted.contains(&EntityScope::new(
                EntityType::Workspace,
                workspace_id,
                required.scope,
            ));
            let via_org = granted.contains(&EntityScope::new(
                EntityType::Organization,
                organization_id,
                required.scope,
            ));
            Ok(via_workspace || via_org)
        }
    }
}

/// The stable public vocabulary of actions this system knows about. Kept as
/// data (a lookup table), not a `match` sprinkled through call sites — see
/// spec §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    ListOrganizations,
    CreateOrganization,
    DeleteOrganization,
    ListWorkspaces,
    CreateWorkspace,
    UpdateWorkspace,
    DeleteWorkspace,
    ListResources,
    ReadResource,
    CreateResource,
    UpdateResource,
    DeleteResource,
}

/// `Action → required scopes`. **All** listed scopes must hold for the
/// action to be permitted — an action may name more than one
/// `(EntityType, Scope)` pair, as with `delete_workspace` needing both
/// organization-level write and workspace-level admin.
pub static ACTION_TABLE: LazyLock<HashMap<Action, Vec<EntityTypeScope>>> = LazyLock::new(|| {
    use Action::*;
    use EntityType::*;
    use Scope::*;
    let mut m = HashMap::new();
    m.insert(ListOrganizations, vec![EntityTypeScope::new(System, Read)]);
    m.insert(CreateOrganization, vec![EntityTypeScope::new(System, Write)]);
    m.insert(DeleteOrganization, vec![
        EntityTypeScope::new(Organization, Admin),
        EntityTypeScope::new(System, Write),
    ]);
    m.insert(ListWorkspaces, vec![EntityTypeScope::new(Organization, Read)]);
    m.insert(CreateWorkspace, vec![EntityTypeScope::new(Organization, Write)]);
    m.insert(UpdateWorkspace, vec![EntityTypeScope::new(Workspace, Write)]);
    m.insert(DeleteWorkspace, vec![
        EntityTypeScope::new(Organization, Write),
        EntityTypeScope::new(Workspace, Admin),
    ]);
    m.insert(ListResources, vec![EntityTypeScope::new(Workspace, Read)]);
    m.insert(ReadResource, vec![EntityTypeScope::new(Resource, Read)]);
    m.insert(CreateResource, vec![EntityTypeScope::new(Workspace, Write)]);
    m.insert(UpdateResource, vec![EntityTypeScope::new(Resource, Write)]);
    m.insert(DeleteResource, vec![EntityTypeScope::new(Resource, Admin)]);
    m
});

/// Look up the scopes an [`Action`] requires, resolving each entry's
/// concrete id through `id_for`. A single `entity_id` is not enough here:
/// `delete_workspace`'s `(Organization, Write)` entry needs the id of the
/// organization that *owns* the target workspace, not the workspace's own
/// id, while its `(Workspace, Admin)` entry needs the workspace's id — two
/// different ids for one action. Resolving the owning organization id is a
/// store lookup (the same parent resolution `verify`/`issue` perform
/// internally before calling [`is_satisfied`]), so it is the caller's job
/// to supply it here rather than this module performing I/O.
pub fn required_scopes_for(
    action: Action,
    id_for: impl Fn(EntityType) -> i64,
) -> Vec<EntityScope> {
    ACTION_TABLE
        .get(&action)
        .map(|scopes| scopes.iter().map(|s| s.at(id_for(s.entity_type))).collect())
        .unwrap_or_default()
}
