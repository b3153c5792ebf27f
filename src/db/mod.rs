mod reservation;
mod role;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use reservation::{
    Capacity, NewReservation, Reservation, ReservationStore, TableSize, DEFAULT_TABLE_CAPACITY,
};
pub use role::{AssignedRole, RoleStore};
pub use user::{User, UserStore};
pub(crate) use user::is_unique_violation;

use crate::auth::roles::ALL_ROLES;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            // Every connection to sqlite::memory: is its own database, so pin one
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        if version < 2 {
            self.migrate_v2().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id TEXT PRIMARY KEY,
                    phone TEXT UNIQUE NOT NULL,
                    name TEXT,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE TABLE roles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL
                )",
                // One row per assignment; scope_id NULL covers the whole scope type
                "CREATE TABLE user_roles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                    scope_type TEXT NOT NULL DEFAULT 'global',
                    scope_id TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_user_roles_user_id ON user_roles(user_id)",
                "CREATE UNIQUE INDEX idx_user_roles_unique
                    ON user_roles(user_id, role_id, scope_type, IFNULL(scope_id, ''))",
            ],
        )
        .await?;

        for name in ALL_ROLES {
            sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
                .bind(name)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                "CREATE TABLE restaurant_capacity (
                    restaurant_id TEXT PRIMARY KEY,
                    table2 INTEGER NOT NULL DEFAULT 5,
                    table4 INTEGER NOT NULL DEFAULT 5,
                    table6 INTEGER NOT NULL DEFAULT 5,
                    table8 INTEGER NOT NULL DEFAULT 5
                )",
                // Times are unix seconds
                "CREATE TABLE reservations (
                    id TEXT PRIMARY KEY,
                    restaurant_id TEXT NOT NULL,
                    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
                    from_ts INTEGER NOT NULL,
                    to_ts INTEGER,
                    party_size INTEGER,
                    note TEXT,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_reservations_restaurant ON reservations(restaurant_id, from_ts)",
                "CREATE INDEX idx_reservations_user ON reservations(user_id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the role assignment store.
    pub fn roles(&self) -> RoleStore {
        RoleStore::new(self.pool.clone())
    }

    /// Get the reservation store.
    pub fn reservations(&self) -> ReservationStore {
        ReservationStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
