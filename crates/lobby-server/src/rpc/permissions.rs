//! Role-based authorization of inbound method calls.

use std::collections::BTreeMap;

use lobby_core::Role;
use lobby_rpc::RpcError;
use lobby_rpc::messages::{KEEP_ALIVE, METHOD_PING, METHOD_PONG};
use lobby_settings::RolePermissions;
use tracing::warn;

/// Methods every role may call.
pub const ALWAYS_ALLOWED: [&str; 3] = [METHOD_PING, METHOD_PONG, KEEP_ALIVE];

/// Method allow-lists keyed by role.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    table: BTreeMap<Role, Vec<String>>,
}

impl Permissions {
    /// Whether `role` may call `method`.
    pub fn allows(&self, role: Role, method: &str) -> bool {
        ALWAYS_ALLOWED.contains(&method)
            || self
                .table
                .get(&role)
                .is_some_and(|allowed| allowed.iter().any(|m| m == "*" || m == method))
    }

    /// [`Permissions::allows`] as a result carrying the wire error.
    pub fn authorize(&self, role: Role, method: &str) -> Result<(), RpcError> {
        if self.allows(role, method) {
            Ok(())
        } else {
            Err(RpcError::Unauthorized {
                method: method.to_owned(),
            })
        }
    }

    /// Methods configured for `role`.
    pub fn allowed(&self, role: Role) -> &[String] {
        self.table.get(&role).map_or(&[], Vec::as_slice)
    }
}

impl From<&RolePermissions> for Permissions {
    fn from(config: &RolePermissions) -> Self {
        let mut table = BTreeMap::new();
        for (name, methods) in &config.0 {
            match name.parse::<Role>() {
                Ok(role) => {
                    let _ = table.insert(role, methods.clone());
                }
                Err(err) => warn!(error = %err, "ignoring permissions for unknown role"),
            }
        }
        Self { table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn defaults() -> Permissions {
        Permissions::from(&RolePermissions::default())
    }

    #[test]
    fn liveness_methods_are_always_allowed() {
        let perms = Permissions::default();
        for method in ALWAYS_ALLOWED {
            assert!(perms.allows(Role::Guest, method));
        }
        assert!(!perms.allows(Role::Guest, "identify"));
    }

    #[test]
    fn guests_are_refused_everything_else() {
        let perms = defaults();
        let err = perms.authorize(Role::Guest, "list-users").unwrap_err();
        assert_eq!(err.code(), lobby_rpc::errors::UNAUTHORIZED);
        assert_matches!(err, RpcError::Unauthorized { method } if method == "list-users");
    }

    #[test]
    fn wildcard_allows_any_method() {
        let perms = defaults();
        assert!(perms.allows(Role::LobbySuperuser, "anything-at-all"));
        assert!(!perms.allows(Role::LobbyMember, "anything-at-all"));
    }

    #[test]
    fn unknown_role_names_are_skipped() {
        let mut config = RolePermissions::default();
        let _ = config.0.insert("room.janitor".into(), vec!["*".into()]);
        let perms = Permissions::from(&config);
        assert_eq!(perms.allowed(Role::RoomMember).len(), defaults().allowed(Role::RoomMember).len());
        assert!(perms.allows(Role::RoomOwner, "close-room"));
        assert!(!perms.allows(Role::RoomMember, "close-room"));
    }
}
