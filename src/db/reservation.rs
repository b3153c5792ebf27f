//! Reservations and per-restaurant table capacity.
//!
//! Tables come in four sizes. A reservation occupies one table of the
//! smallest size that seats its party; a reservation without a party size
//! occupies a two-seat table.

use sqlx::sqlite::{SqliteConnection, SqlitePool};

/// Tables of each size when a restaurant has no capacity row.
pub const DEFAULT_TABLE_CAPACITY: i64 = 5;

const DEFAULT_PARTY_SIZE: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSize {
    Two,
    Four,
    Six,
    Eight,
}

impl TableSize {
    pub fn for_party(party_size: i64) -> Self {
        match party_size {
            i64::MIN..=2 => TableSize::Two,
            3..=4 => TableSize::Four,
            5..=6 => TableSize::Six,
            _ => TableSize::Eight,
        }
    }

    pub fn seats(self) -> i64 {
        match self {
            TableSize::Two => 2,
            TableSize::Four => 4,
            TableSize::Six => 6,
            TableSize::Eight => 8,
        }
    }

    /// Party sizes seated at this table: `(exclusive lower, inclusive upper)`.
    fn party_range(self) -> (i64, i64) {
        match self {
            TableSize::Two => (i64::MIN, 2),
            TableSize::Four => (2, 4),
            TableSize::Six => (4, 6),
            TableSize::Eight => (6, i64::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Capacity {
    pub table2: i64,
    pub table4: i64,
    pub table6: i64,
    pub table8: i64,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            table2: DEFAULT_TABLE_CAPACITY,
            table4: DEFAULT_TABLE_CAPACITY,
            table6: DEFAULT_TABLE_CAPACITY,
            table8: DEFAULT_TABLE_CAPACITY,
        }
    }
}

impl Capacity {
    pub fn for_size(&self, size: TableSize) -> i64 {
        match size {
            TableSize::Two => self.table2,
            TableSize::Four => self.table4,
            TableSize::Six => self.table6,
            TableSize::Eight => self.table8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Reservation {
    pub id: String,
    pub restaurant_id: String,
    pub user_id: Option<String>,
    /// Unix seconds
    pub from_ts: i64,
    pub to_ts: Option<i64>,
    pub party_size: Option<i64>,
    pub note: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub restaurant_id: String,
    pub user_id: Option<String>,
    pub from_ts: i64,
    pub to_ts: i64,
    pub party_size: Option<i64>,
    pub note: Option<String>,
}

impl NewReservation {
    pub fn table_size(&self) -> TableSize {
        TableSize::for_party(self.party_size.unwrap_or(DEFAULT_PARTY_SIZE))
    }
}

#[derive(Clone)]
pub struct ReservationStore {
    pool: SqlitePool,
}

async fn load_capacity(
    conn: &mut SqliteConnection,
    restaurant_id: &str,
) -> Result<Capacity, sqlx::Error> {
    let row: Option<Capacity> = sqlx::query_as(
        "SELECT table2, table4, table6, table8 FROM restaurant_capacity WHERE restaurant_id = ?",
    )
    .bind(restaurant_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.unwrap_or_default())
}

/// Reservations of `size` whose window intersects `[from_ts, to_ts)`.
/// An open-ended reservation (no end) overlaps everything after its start.
async fn count_overlapping_in(
    conn: &mut SqliteConnection,
    restaurant_id: &str,
    from_ts: i64,
    to_ts: i64,
    size: TableSize,
) -> Result<i64, sqlx::Error> {
    let (lower, upper) = size.party_range();
    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reservations
         WHERE restaurant_id = ?
           AND from_ts < ?
           AND (to_ts IS NULL OR to_ts > ?)
           AND COALESCE(party_size, 2) > ?
           AND COALESCE(party_size, 2) <= ?",
    )
    .bind(restaurant_id)
    .bind(to_ts)
    .bind(from_ts)
    .bind(lower)
    .bind(upper)
    .fetch_one(conn)
    .await?;
    Ok(count.0)
}

impl ReservationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn capacity(&self, restaurant_id: &str) -> Result<Capacity, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        load_capacity(&mut conn, restaurant_id).await
    }

    pub async fn set_capacity(
        &self,
        restaurant_id: &str,
        capacity: Capacity,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO restaurant_capacity (restaurant_id, table2, table4, table6, table8)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(restaurant_id) DO UPDATE SET
                table2 = excluded.table2,
                table4 = excluded.table4,
                table6 = excluded.table6,
                table8 = excluded.table8",
        )
        .bind(restaurant_id)
        .bind(capacity.table2)
        .bind(capacity.table4)
        .bind(capacity.table6)
        .bind(capacity.table8)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_overlapping(
        &self,
        restaurant_id: &str,
        from_ts: i64,
        to_ts: i64,
        size: TableSize,
    ) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        count_overlapping_in(&mut conn, restaurant_id, from_ts, to_ts, size).await
    }

    /// Insert the reservation unless its table size is fully booked for the
    /// window. The count and the insert share one transaction; callers still
    /// serialize per restaurant since SQLite transactions start deferred.
    pub async fn create_within_capacity(
        &self,
        new: &NewReservation,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        let size = new.table_size();
        let mut tx = self.pool.begin().await?;

        let capacity = load_capacity(&mut tx, &new.restaurant_id)
            .await?
            .for_size(size);
        let booked =
            count_overlapping_in(&mut tx, &new.restaurant_id, new.from_ts, new.to_ts, size)
                .await?;
        if booked >= capacity {
            tx.rollback().await?;
            return Ok(None);
        }

        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            restaurant_id: new.restaurant_id.clone(),
            user_id: new.user_id.clone(),
            from_ts: new.from_ts,
            to_ts: Some(new.to_ts),
            party_size: new.party_size,
            note: new.note.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };

        sqlx::query(
            "INSERT INTO reservations (id, restaurant_id, user_id, from_ts, to_ts, party_size, note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&reservation.id)
        .bind(&reservation.restaurant_id)
        .bind(&reservation.user_id)
        .bind(reservation.from_ts)
        .bind(reservation.to_ts)
        .bind(reservation.party_size)
        .bind(&reservation.note)
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(reservation))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Reservation>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, restaurant_id, user_id, from_ts, to_ts, party_size, note, created_at
             FROM reservations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
    ) -> Result<Vec<Reservation>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, restaurant_id, user_id, from_ts, to_ts, party_size, note, created_at
             FROM reservations WHERE restaurant_id = ? ORDER BY from_ts",
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await
    }

    /// A user's reservations, most recently made first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Reservation>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, restaurant_id, user_id, from_ts, to_ts, party_size, note, created_at
             FROM reservations WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
