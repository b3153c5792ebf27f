use sqlx::sqlite::SqlitePool;

use crate::auth::ScopeType;

#[derive(Clone)]
pub struct RoleStore {
    pool: SqlitePool,
}

/// A role assignment joined with its role name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignedRole {
    pub role_name: String,
    pub scope_type: String,
    pub scope_id: Option<String>,
}

impl RoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<AssignedRole>, sqlx::Error> {
        sqlx::query_as(
            "SELECT r.name AS role_name, ur.scope_type, ur.scope_id
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = ?
             ORDER BY ur.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Grant a role. Returns false if the role name is unknown or the
    /// assignment already exists.
    pub async fn assign(
        &self,
        user_id: &str,
        role_name: &str,
        scope_type: &ScopeType,
        scope_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id, scope_type, scope_id)
             SELECT ?, id, ?, ? FROM roles WHERE name = ?",
        )
        .bind(user_id)
        .bind(scope_type.as_str())
        .bind(scope_id)
        .bind(role_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
