use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserRole;

/// Dashboard modules a permission can be granted on.
pub const MODULES: [&str; 8] = [
    "branches",
    "dashboard",
    "leads",
    "login_history",
    "notifications",
    "roles",
    "users",
    "website_settings",
];

text_enum! {
    /// Operation on a module.
    pub enum Action {
        Create => "create",
        Read => "read",
        Edit => "edit",
        Delete => "delete",
    }
}

/// Module name to allowed actions.
///
/// Serialized with modules sorted by name and actions in
/// create, read, edit, delete order, duplicates removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, BTreeSet<Action>>);

impl Permissions {
    /// Grant `actions` on `module`, replacing previous grants.
    pub fn grant(
        mut self,
        module: impl Into<String>,
        actions: impl IntoIterator<Item = Action>,
    ) -> Self {
        self.0.insert(module.into(), actions.into_iter().collect());
        self
    }

    pub fn allows(&self, module: &str, action: Action) -> bool {
        self.0
            .get(module)
            .is_some_and(|actions| actions.contains(&action))
    }

    /// Modules that are not part of [`MODULES`].
    pub fn unknown_modules(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|m| !MODULES.contains(m))
            .collect()
    }

    /// Built-in grants for `role`.
    pub fn defaults_for(role: UserRole) -> Self {
        use Action::*;

        let all = [Create, Read, Edit, Delete];
        match role {
            UserRole::Superadmin => MODULES
                .iter()
                .fold(Self::default(), |p, module| p.grant(*module, all)),
            UserRole::Admin => Self::default()
                .grant("dashboard", [Read])
                .grant("leads", all)
                .grant("users", [Read])
                .grant("branches", [Read])
                .grant("notifications", [Read])
                .grant("login_history", [Read]),
            UserRole::Supervisor => Self::default()
                .grant("dashboard", [Read])
                .grant("leads", [Create, Read, Edit])
                .grant("users", [Read])
                .grant("notifications", [Read]),
            UserRole::Staff => Self::default()
                .grant("dashboard", [Read])
                .grant("leads", [Read, Edit])
                .grant("notifications", [Read]),
        }
    }
}

/// Permission document, one per [`UserRole`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: UserRole,
    pub permissions: Permissions,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: UserRole, permissions: Permissions) -> Self {
        Self {
            name,
            permissions,
            updated_at: Utc::now(),
        }
    }

    /// Role with its built-in permissions.
    pub fn default_for(name: UserRole) -> Self {
        Self::new(name, Permissions::defaults_for(name))
    }
}
