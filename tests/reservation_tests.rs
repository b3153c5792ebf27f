//! Tests for reservations, restaurant management and admin endpoints.

mod common;

use axum::http::StatusCode;
use bistro::auth::ScopeType;
use bistro::auth::roles::{ADMIN, MANAGER, OWNER, WAITER};
use bistro::db::Capacity;
use common::*;
use serde_json::json;

fn access_cookie(session: &Session) -> String {
    format!("access_token={}", session.access)
}

async fn book(t: &TestApp, cookie: &str, body: serde_json::Value) -> axum::http::Response<axum::body::Body> {
    t.send(json_request("POST", "/api/reservations", Some(cookie), body))
        .await
}

// =============================================================================
// Booking
// =============================================================================

#[tokio::test]
async fn test_create_reservation_returns_dto() {
    let t = setup().await;
    let user = t.create_user("0820000001", None).await;
    let session = t.sign_in(&user).await;

    let response = book(
        &t,
        &access_cookie(&session),
        json!({
            "restaurantId": "r1",
            "fromDate": "2030-05-01T19:00:00Z",
            "partySize": 3,
            "note": "window",
            "tableBreakdown": { "4": 1 },
            "tablesCount": 1
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["restaurantId"], "r1");
    assert_eq!(body["userId"], user.id.as_str());
    assert_eq!(body["fromDate"], "2030-05-01T19:00:00.000Z");
    assert_eq!(body["toDate"], "2030-05-01T20:00:00.000Z");
    assert_eq!(body["partySize"], 3);

    let note: serde_json::Value = serde_json::from_str(body["note"].as_str().unwrap()).unwrap();
    assert_eq!(note["noteText"], "window");
    assert_eq!(note["tablesCount"], 1);
}

#[tokio::test]
async fn test_create_reservation_validates_body() {
    let t = setup().await;
    let user = t.create_user("0820000002", None).await;
    let session = t.sign_in(&user).await;
    let cookie = access_cookie(&session);

    let response = book(&t, &cookie, json!({ "restaurantId": "r1" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "restaurantId and fromDate are required" })
    );

    let response = book(
        &t,
        &cookie,
        json!({ "restaurantId": "r1", "fromDate": "next friday" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capacity_exhaustion_conflicts() {
    let t = setup().await;
    t.db.reservations()
        .set_capacity(
            "r1",
            Capacity {
                table2: 2,
                ..Capacity::default()
            },
        )
        .await
        .unwrap();
    let user = t.create_user("0820000003", None).await;
    let session = t.sign_in(&user).await;
    let cookie = access_cookie(&session);

    let slot = json!({
        "restaurantId": "r1",
        "fromDate": "2030-05-01T19:00:00Z",
        "toDate": "2030-05-01T21:00:00Z",
        "partySize": 2
    });
    for _ in 0..2 {
        let response = book(&t, &cookie, slot.clone()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Overlapping window in the same bucket
    let response = book(
        &t,
        &cookie,
        json!({ "restaurantId": "r1", "fromDate": "2030-05-01T20:00:00Z", "partySize": 1 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "No availability for selected time and table size" })
    );

    // Other buckets, restaurants and windows are unaffected
    let other_bucket = json!({ "restaurantId": "r1", "fromDate": "2030-05-01T19:00:00Z", "partySize": 4 });
    assert_eq!(book(&t, &cookie, other_bucket).await.status(), StatusCode::CREATED);

    let other_restaurant = json!({ "restaurantId": "r2", "fromDate": "2030-05-01T19:00:00Z" });
    assert_eq!(book(&t, &cookie, other_restaurant).await.status(), StatusCode::CREATED);

    let later = json!({ "restaurantId": "r1", "fromDate": "2030-05-01T21:00:00Z", "partySize": 2 });
    assert_eq!(book(&t, &cookie, later).await.status(), StatusCode::CREATED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_respect_capacity() {
    use tower::ServiceExt;

    // Several pooled connections, so only the restaurant lock keeps the
    // count-then-insert transactions apart
    let t = setup_on_disk().await;
    t.db.reservations()
        .set_capacity(
            "r1",
            Capacity {
                table2: 1,
                ..Capacity::default()
            },
        )
        .await
        .unwrap();
    let user = t.create_user("0820000004", None).await;
    let session = t.sign_in(&user).await;
    let cookie = access_cookie(&session);

    let slot = json!({ "restaurantId": "r1", "fromDate": "2030-05-01T19:00:00Z" });
    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let app = t.app.clone();
            let request = json_request("POST", "/api/reservations", Some(&cookie), slot.clone());
            tokio::spawn(async move { app.oneshot(request).await.unwrap().status() })
        })
        .collect();

    let mut statuses = Vec::new();
    for attempt in attempts {
        statuses.push(attempt.await.unwrap());
    }
    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!((created, conflicts), (1, 7), "{statuses:?}");
    assert_eq!(t.db.reservations().list_for_restaurant("r1").await.unwrap().len(), 1);
}

// =============================================================================
// Removal
// =============================================================================

#[tokio::test]
async fn test_remove_own_reservation() {
    let t = setup().await;
    let owner = t.create_user("0820000010", None).await;
    let other = t.create_user("0820000011", None).await;
    let owner_session = t.sign_in(&owner).await;
    let other_session = t.sign_in(&other).await;

    let response = book(
        &t,
        &access_cookie(&owner_session),
        json!({ "restaurantId": "r1", "fromDate": "2030-05-01T19:00:00Z" }),
    )
    .await;
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    // Someone else's reservation looks missing
    let response = t
        .send(json_request(
            "DELETE",
            "/api/reservations/remove",
            Some(&access_cookie(&other_session)),
            json!({ "id": id }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = t
        .send(json_request(
            "DELETE",
            "/api/reservations/remove",
            Some(&access_cookie(&owner_session)),
            json!({ "id": id }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "success": true }));
    assert!(t.db.reservations().get(&id).await.unwrap().is_none());

    let response = t
        .send(json_request(
            "DELETE",
            "/api/reservations/remove",
            Some(&access_cookie(&owner_session)),
            json!({ "id": id }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remove_requires_session_and_id() {
    let t = setup().await;

    let response = t
        .send(json_request(
            "DELETE",
            "/api/reservations/remove",
            None,
            json!({ "id": "x" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let user = t.create_user("0820000012", None).await;
    let session = t.sign_in(&user).await;
    let response = t
        .send(json_request(
            "DELETE",
            "/api/reservations/remove",
            Some(&access_cookie(&session)),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": "Invalid body" }));
}

// =============================================================================
// Availability
// =============================================================================

#[tokio::test]
async fn test_availability_tracks_bookings() {
    let t = setup().await;
    let user = t.create_user("0820000020", None).await;
    let session = t.sign_in(&user).await;
    let query = "/api/reservations/availability?restaurantId=r1&fromDate=2030-05-01T19:00:00Z&partySize=2";

    let response = t.send(get(query, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "restaurantId": "r1", "tableSize": 2, "capacity": 5, "booked": 0, "available": 5 })
    );

    let response = book(
        &t,
        &access_cookie(&session),
        json!({ "restaurantId": "r1", "fromDate": "2030-05-01T19:30:00Z" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The booking invalidated the cached answer
    let body = body_json(t.send(get(query, None)).await).await;
    assert_eq!(body["booked"], 1);
    assert_eq!(body["available"], 4);
}

// =============================================================================
// Own reservations
// =============================================================================

#[tokio::test]
async fn test_my_reservations_refreshes_and_decodes_notes() {
    let t = setup().await;
    let user = t.create_user("0820000025", None).await;
    let other = t.create_user("0820000026", None).await;
    let session = t.sign_in(&user).await;
    let other_session = t.sign_in(&other).await;

    book(
        &t,
        &access_cookie(&session),
        json!({
            "restaurantId": "r1",
            "fromDate": "2030-05-01T19:00:00Z",
            "partySize": 6,
            "note": "anniversary",
            "tableBreakdown": { "4": 1, "2": 1 },
            "tablesCount": 2
        }),
    )
    .await;
    book(
        &t,
        &access_cookie(&other_session),
        json!({ "restaurantId": "r1", "fromDate": "2030-05-01T19:00:00Z" }),
    )
    .await;

    let cookie = format!(
        "access_token={}; refresh_token={}",
        expired_access_token(&user),
        session.refresh
    );
    let response = t.send(get("/api/reservations/mine", Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    let access = cookie_value(&cookies, "access_token").expect("renewed access cookie");
    assert_eq!(t.jwt.validate_access_token(&access).unwrap().sub, user.id);
    assert!(cookie_value(&cookies, "refresh_token").is_none());
    assert!(t.registry.exists(&session.jti).await.unwrap());

    let body = body_json(response).await;
    let reservations = body["reservations"].as_array().unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0]["restaurantId"], "r1");
    assert_eq!(reservations[0]["partySize"], 6);
    assert_eq!(reservations[0]["note"], "anniversary");
    assert_eq!(reservations[0]["tableBreakdown"], json!({ "4": 1, "2": 1 }));
    assert_eq!(reservations[0]["tablesCount"], 2);
}

#[tokio::test]
async fn test_my_reservations_with_access_token_sets_no_cookies() {
    let t = setup().await;
    let user = t.create_user("0820000027", None).await;
    let session = t.sign_in(&user).await;

    let response = t
        .send(get("/api/reservations/mine", Some(&access_cookie(&session))))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_json(response).await, json!({ "reservations": [] }));
}

#[tokio::test]
async fn test_my_reservations_requires_session() {
    let t = setup().await;
    let user = t.create_user("0820000028", None).await;
    let session = t.sign_in(&user).await;
    t.registry.revoke(&session.jti).await.unwrap();

    let response = t.send(get("/api/reservations/mine", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({ "error": "Unauthorized" }));

    let cookie = format!("refresh_token={}", session.refresh);
    let response = t.send(get("/api/reservations/mine", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

// =============================================================================
// Management
// =============================================================================

#[tokio::test]
async fn test_management_requires_scoped_manager() {
    let t = setup().await;
    let manager = t.create_user("0820000030", None).await;
    let waiter = t.create_user("0820000031", None).await;
    t.db.roles()
        .assign(&manager.id, MANAGER, &ScopeType::Restaurant, Some("r1"))
        .await
        .unwrap();
    t.db.roles()
        .assign(&waiter.id, WAITER, &ScopeType::Global, None)
        .await
        .unwrap();
    let manager_session = t.sign_in(&manager).await;
    let waiter_session = t.sign_in(&waiter).await;

    book(
        &t,
        &access_cookie(&waiter_session),
        json!({ "restaurantId": "r1", "fromDate": "2030-05-01T19:00:00Z" }),
    )
    .await;

    let response = t
        .send(get(
            "/api/management/restaurants/r1/reservations",
            Some(&access_cookie(&manager_session)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["reservations"].as_array().unwrap().len(), 1);

    // Scoped to r1 only
    let response = t
        .send(get(
            "/api/management/restaurants/r2/reservations",
            Some(&access_cookie(&manager_session)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({ "error": "Forbidden" }));

    let response = t
        .send(get(
            "/api/management/restaurants/r1/reservations",
            Some(&access_cookie(&waiter_session)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t
        .send(get("/api/management/restaurants/r1/reservations", None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_global_owner_manages_every_restaurant() {
    let t = setup().await;
    let owner = t.create_user("0820000032", None).await;
    t.db.roles()
        .assign(&owner.id, OWNER, &ScopeType::Global, None)
        .await
        .unwrap();
    let session = t.sign_in(&owner).await;

    for restaurant in ["r1", "r7"] {
        let response = t
            .send(get(
                &format!("/api/management/restaurants/{restaurant}/reservations"),
                Some(&access_cookie(&session)),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// =============================================================================
// Admin
// =============================================================================

#[tokio::test]
async fn test_admin_revokes_refresh_token() {
    let t = setup().await;
    let admin = t.create_user("0820000040", None).await;
    t.db.roles()
        .assign(&admin.id, ADMIN, &ScopeType::Global, None)
        .await
        .unwrap();
    let victim = t.create_user("0820000041", None).await;
    let admin_session = t.sign_in(&admin).await;
    let victim_session = t.sign_in(&victim).await;

    let response = t
        .send(json_request(
            "DELETE",
            &format!("/api/admin/tokens/{}", victim_session.jti),
            Some(&access_cookie(&admin_session)),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "revoked": true }));

    // The victim's refresh token no longer works
    let cookie = format!("refresh_token={}", victim_session.refresh);
    let response = t.send(get("/profile", Some(&cookie))).await;
    assert_eq!(location(&response), Some("/login?from=%2Fprofile"));
}

#[tokio::test]
async fn test_admin_endpoints_reject_non_admins() {
    let t = setup().await;
    let manager = t.create_user("0820000042", None).await;
    t.db.roles()
        .assign(&manager.id, MANAGER, &ScopeType::Restaurant, Some("r1"))
        .await
        .unwrap();
    let session = t.sign_in(&manager).await;

    let response = t
        .send(get(
            &format!("/api/admin/users/{}/roles", manager.id),
            Some(&access_cookie(&session)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t
        .send(get(&format!("/api/admin/users/{}/roles", manager.id), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_lists_user_roles() {
    let t = setup().await;
    let owner = t.create_user("0820000043", None).await;
    t.db.roles()
        .assign(&owner.id, OWNER, &ScopeType::Global, None)
        .await
        .unwrap();
    let chef = t.create_user("0820000044", None).await;
    t.db.roles()
        .assign(&chef.id, "CHEF", &ScopeType::Branch, Some("b1"))
        .await
        .unwrap();
    let session = t.sign_in(&owner).await;

    let response = t
        .send(get(
            &format!("/api/admin/users/{}/roles", chef.id),
            Some(&access_cookie(&session)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["roles"][0]["name"], "CHEF");
    assert_eq!(body["roles"][0]["scopeType"], "branch");

    let response = t
        .send(get("/api/admin/users/missing/roles", Some(&access_cookie(&session))))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
