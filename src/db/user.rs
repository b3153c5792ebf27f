use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub phone: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub created_at: String,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user. Returns the generated id.
    /// Fails with a unique-constraint error if the phone is taken.
    pub async fn create(
        &self,
        phone: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<String, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO users (id, phone, name, password_hash) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(phone)
            .bind(name)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT id, phone, name, password_hash, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_by_phone(&self, phone: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, phone, name, password_hash, created_at FROM users WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Whether an insert failed on a UNIQUE constraint.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
