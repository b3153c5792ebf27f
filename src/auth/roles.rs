//! Role assignments and scoped role checks.
//!
//! A user holds any number of `(role, scope type, scope id)` assignments.
//! Assignments are loaded from the database through a short-lived cache
//! keyed `userroles:{user id}`; expiry is the only invalidation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::errors::AuthError;
use crate::cache::KeyValueStore;
use crate::db::Database;

pub const OWNER: &str = "OWNER";
pub const ADMIN: &str = "ADMIN";
pub const MANAGER: &str = "MANAGER";
pub const CHEF: &str = "CHEF";
pub const KITCHEN: &str = "KITCHEN";
pub const WAITER: &str = "WAITER";
pub const CASHIER: &str = "CASHIER";

/// Every role the catalogue is seeded with.
pub const ALL_ROLES: [&str; 7] = [OWNER, ADMIN, MANAGER, CHEF, KITCHEN, WAITER, CASHIER];

/// What an assignment applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Global,
    Restaurant,
    Branch,
    Other(String),
}

impl ScopeType {
    pub fn as_str(&self) -> &str {
        match self {
            ScopeType::Global => "global",
            ScopeType::Restaurant => "restaurant",
            ScopeType::Branch => "branch",
            ScopeType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "global" => ScopeType::Global,
            "restaurant" => ScopeType::Restaurant,
            "branch" => ScopeType::Branch,
            other => ScopeType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ScopeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScopeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ScopeType::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub name: String,
    pub scope_type: ScopeType,
    #[serde(default)]
    pub scope_id: Option<String>,
}

/// Scope a role check is asked about. The empty query matches any scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeQuery {
    pub scope_type: Option<ScopeType>,
    pub scope_id: Option<String>,
}

impl ScopeQuery {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn within(scope_type: ScopeType) -> Self {
        Self {
            scope_type: Some(scope_type),
            scope_id: None,
        }
    }

    pub fn with_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn restaurant(id: impl Into<String>) -> Self {
        Self::within(ScopeType::Restaurant).with_id(id)
    }
}

/// Whether any assignment grants `role_name` for `scope`.
///
/// Global assignments authorize every scope. A scoped assignment without an
/// id covers every id of its type.
pub fn user_has_role(roles: &[RoleAssignment], role_name: &str, scope: &ScopeQuery) -> bool {
    roles.iter().any(|role| {
        if role.name != role_name {
            return false;
        }
        let Some(wanted_type) = &scope.scope_type else {
            return true;
        };
        if role.scope_type == ScopeType::Global {
            return true;
        }
        if &role.scope_type != wanted_type {
            return false;
        }
        match (&scope.scope_id, &role.scope_id) {
            (None, _) | (Some(_), None) => true,
            (Some(wanted), Some(held)) => wanted == held,
        }
    })
}

/// Loads role assignments with a read-through cache.
#[derive(Clone)]
pub struct RoleResolver {
    db: Database,
    cache: Arc<dyn KeyValueStore>,
    ttl_secs: u64,
}

impl RoleResolver {
    pub fn new(db: Database, cache: Arc<dyn KeyValueStore>, ttl_secs: u64) -> Self {
        Self {
            db,
            cache,
            ttl_secs,
        }
    }

    fn cache_key(user_id: &str) -> String {
        format!("userroles:{user_id}")
    }

    pub async fn get_user_roles(&self, user_id: &str) -> Result<Vec<RoleAssignment>, AuthError> {
        let key = Self::cache_key(user_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(roles) => return Ok(roles),
                Err(e) => warn!(user_id = %user_id, error = %e, "Discarding malformed role cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "Role cache read failed"),
        }

        let roles: Vec<RoleAssignment> = self
            .db
            .roles()
            .list_for_user(user_id)
            .await
            .map_err(|e| AuthError::RoleLookupFailure(e.to_string()))?
            .into_iter()
            .map(|row| RoleAssignment {
                name: row.role_name,
                scope_type: ScopeType::parse(&row.scope_type),
                scope_id: row.scope_id,
            })
            .collect();

        match serde_json::to_string(&roles) {
            Ok(raw) => {
                if let Err(e) = self.cache.set_ex(&key, &raw, self.ttl_secs).await {
                    warn!(user_id = %user_id, error = %e, "Role cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode roles for cache"),
        }

        Ok(roles)
    }

    /// Lookup failures count as holding no roles.
    pub async fn has_role_for_user(&self, user_id: &str, role_name: &str, scope: &ScopeQuery) -> bool {
        let roles = match self.get_user_roles(user_id).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Role lookup failed, denying");
                Vec::new()
            }
        };
        user_has_role(&roles, role_name, scope)
    }

    /// Whether the user holds any of `role_names` for `scope`.
    pub async fn has_any_role_for_user(
        &self,
        user_id: &str,
        role_names: &[&str],
        scope: &ScopeQuery,
    ) -> bool {
        let roles = match self.get_user_roles(user_id).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Role lookup failed, denying");
                return false;
            }
        };
        role_names
            .iter()
            .any(|name| user_has_role(&roles, name, scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use std::time::Duration;

    fn assignment(name: &str, scope_type: ScopeType, scope_id: Option<&str>) -> RoleAssignment {
        RoleAssignment {
            name: name.to_string(),
            scope_type,
            scope_id: scope_id.map(str::to_string),
        }
    }

    #[test]
    fn test_name_must_match() {
        let roles = vec![assignment(MANAGER, ScopeType::Global, None)];
        assert!(!user_has_role(&roles, OWNER, &ScopeQuery::any()));
        assert!(user_has_role(&roles, MANAGER, &ScopeQuery::any()));
    }

    #[test]
    fn test_global_overrides_scope() {
        let roles = vec![assignment(MANAGER, ScopeType::Global, None)];
        assert!(user_has_role(&roles, MANAGER, &ScopeQuery::restaurant("r1")));
        assert!(user_has_role(
            &roles,
            MANAGER,
            &ScopeQuery::within(ScopeType::Branch).with_id("b9")
        ));
    }

    #[test]
    fn test_scoped_assignment_with_id() {
        let roles = vec![assignment(MANAGER, ScopeType::Restaurant, Some("A"))];

        assert!(user_has_role(&roles, MANAGER, &ScopeQuery::restaurant("A")));
        assert!(!user_has_role(&roles, MANAGER, &ScopeQuery::restaurant("B")));
        assert!(user_has_role(
            &roles,
            MANAGER,
            &ScopeQuery::within(ScopeType::Restaurant)
        ));
        assert!(!user_has_role(
            &roles,
            MANAGER,
            &ScopeQuery::within(ScopeType::Branch).with_id("A")
        ));
    }

    #[test]
    fn test_scoped_assignment_without_id_covers_type() {
        let roles = vec![assignment(WAITER, ScopeType::Restaurant, None)];
        assert!(user_has_role(&roles, WAITER, &ScopeQuery::restaurant("any")));
        assert!(!user_has_role(
            &roles,
            WAITER,
            &ScopeQuery::within(ScopeType::Branch)
        ));
    }

    #[test]
    fn test_scope_type_serialization() {
        let role = assignment(CHEF, ScopeType::Other("kiosk".into()), Some("k1"));
        let json = serde_json::to_value(&role).unwrap();
        assert_eq!(json["scopeType"], "kiosk");
        assert_eq!(json["scopeId"], "k1");

        let back: RoleAssignment = serde_json::from_value(json).unwrap();
        assert_eq!(back, role);
    }

    #[tokio::test]
    async fn test_resolver_reads_through_cache() {
        let db = Database::open(":memory:").await.unwrap();
        let cache = Arc::new(MemoryStore::new());
        let resolver = RoleResolver::new(db.clone(), cache.clone(), 60);

        let user_id = db
            .users()
            .create("0811111111", None, "hash")
            .await
            .unwrap();
        db.roles()
            .assign(&user_id, MANAGER, &ScopeType::Restaurant, Some("r1"))
            .await
            .unwrap();

        let roles = resolver.get_user_roles(&user_id).await.unwrap();
        assert_eq!(roles, vec![assignment(MANAGER, ScopeType::Restaurant, Some("r1"))]);
        assert!(cache.exists(&format!("userroles:{user_id}")).await.unwrap());

        // Cached value wins until it expires
        db.roles()
            .assign(&user_id, OWNER, &ScopeType::Global, None)
            .await
            .unwrap();
        assert!(!resolver.has_role_for_user(&user_id, OWNER, &ScopeQuery::any()).await);

        cache.delete(&format!("userroles:{user_id}")).await.unwrap();
        assert!(resolver.has_role_for_user(&user_id, OWNER, &ScopeQuery::any()).await);
    }

    #[tokio::test]
    async fn test_cached_roles_expire_after_ttl() {
        let db = Database::open(":memory:").await.unwrap();
        let resolver = RoleResolver::new(db.clone(), Arc::new(MemoryStore::new()), 10);

        let user_id = db.users().create("0833333333", None, "hash").await.unwrap();
        assert!(resolver.get_user_roles(&user_id).await.unwrap().is_empty());

        db.roles()
            .assign(&user_id, OWNER, &ScopeType::Global, None)
            .await
            .unwrap();
        assert!(!resolver.has_role_for_user(&user_id, OWNER, &ScopeQuery::any()).await);

        // Paused only around the jump so sqlx pool timeouts never auto-advance
        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::time::resume();

        assert!(resolver.has_role_for_user(&user_id, OWNER, &ScopeQuery::any()).await);
    }

    #[tokio::test]
    async fn test_has_any_role() {
        let db = Database::open(":memory:").await.unwrap();
        let resolver = RoleResolver::new(db.clone(), Arc::new(MemoryStore::new()), 60);

        let user_id = db.users().create("0822222222", None, "hash").await.unwrap();
        db.roles()
            .assign(&user_id, ADMIN, &ScopeType::Global, None)
            .await
            .unwrap();

        assert!(
            resolver
                .has_any_role_for_user(&user_id, &[OWNER, ADMIN], &ScopeQuery::any())
                .await
        );
        assert!(
            !resolver
                .has_any_role_for_user("nobody", &[OWNER, ADMIN], &ScopeQuery::any())
                .await
        );
    }
}
