//! Reservation API endpoints.
//!
//! - POST `/` - Book a table (session required, enforced by the guard)
//! - DELETE `/remove` - Cancel one of your own reservations
//! - GET `/availability` - Free tables of a size for a time window
//! - GET `/mine` - The caller's reservations, refreshing the access cookie when needed

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use super::error::{ApiError, ResultExt, required};
use crate::auth::{ApiAuthError, AuthBackend, CurrentUser, MaybeUser};
use crate::cache::KeyValueStore;
use crate::db::{Database, NewReservation, Reservation, TableSize};
use crate::impl_has_auth_backend;

const DEFAULT_DURATION_SECS: i64 = 60 * 60;
const AVAILABILITY_TTL_SECS: u64 = 30;

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per restaurant, serializing the capacity check and insert.
/// An entry lives only while some request holds or awaits it.
#[derive(Clone, Default)]
pub struct SlotLocks {
    locks: LockMap,
}

/// Held for the duration of one capacity-checked insert.
pub struct SlotGuard {
    guard: Option<OwnedMutexGuard<()>>,
    restaurant_id: String,
    locks: LockMap,
}

impl SlotLocks {
    pub async fn acquire(&self, restaurant_id: &str) -> SlotGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(restaurant_id.to_string())
            .or_default()
            .clone();

        SlotGuard {
            guard: Some(lock.lock_owned().await),
            restaurant_id: restaurant_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Restaurants with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Clones are only taken under the map lock, so a count of one means
        // the map holds the last reference and nobody is queued.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.restaurant_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.restaurant_id);
        }
    }
}

#[derive(Clone)]
pub struct ReservationsState {
    pub db: Database,
    pub auth: AuthBackend,
    pub cache: Arc<dyn KeyValueStore>,
    pub locks: SlotLocks,
}

impl_has_auth_backend!(ReservationsState);

pub fn router(state: ReservationsState) -> Router {
    Router::new()
        .route("/", post(create_reservation))
        .route("/remove", delete(remove_reservation))
        .route("/availability", get(availability))
        .route("/mine", get(my_reservations))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReservationResponse {
    id: String,
    restaurant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    from_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    party_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    created_at: String,
}

fn iso(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            restaurant_id: r.restaurant_id,
            user_id: r.user_id,
            from_date: iso(r.from_ts),
            to_date: r.to_ts.map(iso),
            party_size: r.party_size,
            note: r.note,
            created_at: iso(r.created_at),
        }
    }
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM[:SS]` taken as UTC.
fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().timestamp())
}

/// Resolve the booking window; the end defaults to one hour after the start.
fn booking_window(from: &str, to: Option<&str>) -> Result<(i64, i64), ApiError> {
    let from_ts = parse_timestamp(from).ok_or_else(|| ApiError::invalid("Invalid fromDate"))?;
    let to_ts = match to.map(str::trim).filter(|s| !s.is_empty()) {
        Some(to) => parse_timestamp(to).ok_or_else(|| ApiError::invalid("Invalid toDate"))?,
        None => from_ts + DEFAULT_DURATION_SECS,
    };
    if to_ts <= from_ts {
        return Err(ApiError::invalid("toDate must be after fromDate"));
    }
    Ok((from_ts, to_ts))
}

/// Table breakdown and count travel inside the note as JSON.
fn compose_note(
    note: Option<&str>,
    table_breakdown: Option<&serde_json::Value>,
    tables_count: Option<i64>,
) -> Option<String> {
    let mut payload = serde_json::Map::new();
    if let Some(text) = note.filter(|n| !n.trim().is_empty()) {
        payload.insert("noteText".into(), json!(text));
    }
    if let Some(breakdown) = table_breakdown.filter(|b| b.is_object()) {
        payload.insert("tableBreakdown".into(), breakdown.clone());
    }
    if let Some(count) = tables_count {
        payload.insert("tablesCount".into(), json!(count));
    }

    if payload.is_empty() {
        note.map(str::to_string)
    } else {
        Some(serde_json::Value::Object(payload).to_string())
    }
}

/// Stored note split back into its parts. Plain text and non-object JSON
/// come back as the note text.
#[derive(Debug, Default, PartialEq)]
struct NoteParts {
    text: Option<String>,
    table_breakdown: Option<serde_json::Value>,
    tables_count: Option<i64>,
}

fn decode_note(raw: Option<&str>) -> NoteParts {
    let Some(raw) = raw else {
        return NoteParts::default();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(mut fields)) => NoteParts {
            text: fields
                .get("noteText")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            table_breakdown: fields.remove("tableBreakdown").filter(|v| !v.is_null()),
            tables_count: fields.get("tablesCount").and_then(|v| v.as_i64()),
        },
        _ => NoteParts {
            text: Some(raw.to_string()),
            ..NoteParts::default()
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OwnReservation {
    id: String,
    restaurant_id: String,
    from_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    party_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    table_breakdown: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tables_count: Option<i64>,
    created_at: String,
}

impl From<Reservation> for OwnReservation {
    fn from(r: Reservation) -> Self {
        let note = decode_note(r.note.as_deref());
        Self {
            id: r.id,
            restaurant_id: r.restaurant_id,
            from_date: iso(r.from_ts),
            to_date: r.to_ts.map(iso),
            party_size: r.party_size,
            note: note.text,
            table_breakdown: note.table_breakdown,
            tables_count: note.tables_count,
            created_at: iso(r.created_at),
        }
    }
}

fn generation_key(restaurant_id: &str) -> String {
    format!("availability:{restaurant_id}:gen")
}

/// Invalidate cached availability for a restaurant. Best effort.
async fn bump_availability(cache: &dyn KeyValueStore, restaurant_id: &str) {
    if let Err(e) = cache.incr(&generation_key(restaurant_id)).await {
        warn!(restaurant_id = %restaurant_id, error = %e, "Failed to invalidate availability cache");
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReservationRequest {
    restaurant_id: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    party_size: Option<i64>,
    note: Option<String>,
    table_breakdown: Option<serde_json::Value>,
    tables_count: Option<i64>,
}

async fn create_reservation(
    State(state): State<ReservationsState>,
    MaybeUser(user): MaybeUser,
    Json(body): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    const MISSING: &str = "restaurantId and fromDate are required";
    let restaurant_id = required(body.restaurant_id.as_deref(), MISSING)?;
    let from_date = required(body.from_date.as_deref(), MISSING)?;
    let (from_ts, to_ts) = booking_window(from_date, body.to_date.as_deref())?;

    let new = NewReservation {
        restaurant_id: restaurant_id.to_string(),
        user_id: user.map(|u| u.id),
        from_ts,
        to_ts,
        party_size: body.party_size,
        note: compose_note(
            body.note.as_deref(),
            body.table_breakdown.as_ref(),
            body.tables_count,
        ),
    };

    let created = {
        let _slot = state.locks.acquire(restaurant_id).await;
        state
            .db
            .reservations()
            .create_within_capacity(&new)
            .await
            .db_err("Reservation creation failed")?
    };

    let Some(reservation) = created else {
        info!(restaurant_id = %restaurant_id, "Reservation rejected, no capacity");
        return Err(ApiError::NoCapacity);
    };

    bump_availability(state.cache.as_ref(), restaurant_id).await;
    info!(reservation_id = %reservation.id, restaurant_id = %restaurant_id, "Reservation created");

    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse::from(reservation)),
    ))
}

#[derive(Deserialize)]
struct RemoveRequest {
    id: Option<String>,
}

async fn remove_reservation(
    State(state): State<ReservationsState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<RemoveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = required(body.id.as_deref(), "Invalid body")?;

    let reservation = state
        .db
        .reservations()
        .get(id)
        .await
        .db_err("Failed to load reservation")?
        .filter(|r| r.user_id.as_deref() == Some(user.id.as_str()))
        .ok_or_else(|| ApiError::Missing("Reservation"))?;

    state
        .db
        .reservations()
        .delete(&reservation.id)
        .await
        .db_err("Failed to delete reservation")?;

    bump_availability(state.cache.as_ref(), &reservation.restaurant_id).await;
    info!(reservation_id = %reservation.id, user_id = %user.id, "Reservation removed");

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityQuery {
    restaurant_id: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    party_size: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityResponse {
    restaurant_id: String,
    table_size: i64,
    capacity: i64,
    booked: i64,
    available: i64,
}

async fn availability(
    State(state): State<ReservationsState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    const MISSING: &str = "restaurantId and fromDate are required";
    let restaurant_id = required(query.restaurant_id.as_deref(), MISSING)?;
    let from_date = required(query.from_date.as_deref(), MISSING)?;
    let (from_ts, to_ts) = booking_window(from_date, query.to_date.as_deref())?;
    let size = TableSize::for_party(query.party_size.unwrap_or(2));

    let generation = match state.cache.get(&generation_key(restaurant_id)).await {
        Ok(value) => value.unwrap_or_else(|| "0".to_string()),
        Err(e) => {
            warn!(error = %e, "Availability cache unavailable");
            String::new()
        }
    };
    let cache_key = format!(
        "availability:{restaurant_id}:{generation}:{from_ts}:{to_ts}:{}",
        size.seats()
    );

    if !generation.is_empty() {
        if let Ok(Some(raw)) = state.cache.get(&cache_key).await {
            if let Ok(cached) = serde_json::from_str::<AvailabilityResponse>(&raw) {
                return Ok(Json(cached));
            }
        }
    }

    let store = state.db.reservations();
    let capacity = store
        .capacity(restaurant_id)
        .await
        .db_err("Failed to load capacity")?
        .for_size(size);
    let booked = store
        .count_overlapping(restaurant_id, from_ts, to_ts, size)
        .await
        .db_err("Failed to count reservations")?;

    let response = AvailabilityResponse {
        restaurant_id: restaurant_id.to_string(),
        table_size: size.seats(),
        capacity,
        booked,
        available: (capacity - booked).max(0),
    };

    if !generation.is_empty() {
        if let Ok(raw) = serde_json::to_string(&response) {
            if let Err(e) = state
                .cache
                .set_ex(&cache_key, &raw, AVAILABILITY_TTL_SECS)
                .await
            {
                warn!(error = %e, "Failed to cache availability");
            }
        }
    }

    Ok(Json(response))
}

/// Not covered by a guard rule, so an expired access token is renewed here
/// from the refresh token without rotating it.
async fn my_reservations(
    State(state): State<ReservationsState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut cookies = state.auth.cookie_jar();
    let user = match state.auth.get_user_from_request(&headers) {
        Some(user) => user,
        None => match state.auth.refresh_access_token(&headers, None).await {
            Ok(session) => {
                cookies.push_access(&session.access_token, state.auth.jwt.access_ttl());
                session.user
            }
            Err(e) => {
                if !e.is_credential_failure() {
                    error!("Failed to mint access token: {}", e);
                }
                return Ok(ApiAuthError::Unauthorized.into_response());
            }
        },
    };

    let reservations: Vec<OwnReservation> = state
        .db
        .reservations()
        .list_for_user(&user.id)
        .await
        .db_err("Failed to list reservations")?
        .into_iter()
        .map(OwnReservation::from)
        .collect();

    Ok((cookies, Json(json!({ "reservations": reservations }))).into_response())
}
