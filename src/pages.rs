//! Placeholder HTML pages.
//!
//! Rendering lives in the frontend; these only give the guard something to
//! pass through to and redirect between.

use axum::{
    Router,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::auth::{AuthBackend, MaybeUser};

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>{title} - Bistro</title></head>\n<body><main><h1>{title}</h1>{body}</main></body></html>\n"
    ))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn greeting(user: Option<&crate::auth::AuthenticatedUser>) -> String {
    match user {
        Some(user) => {
            let who = user.name.as_deref().unwrap_or(&user.phone);
            format!("<p>Signed in as {}</p>", escape(who))
        }
        None => String::new(),
    }
}

async fn landing() -> impl IntoResponse {
    page("Welcome", "<p><a href=\"/login\">Sign in</a> or <a href=\"/register\">create an account</a></p>")
}

async fn login() -> impl IntoResponse {
    page("Sign in", "<div id=\"login\"></div>")
}

async fn register() -> impl IntoResponse {
    page("Create account", "<div id=\"register\"></div>")
}

async fn verify() -> impl IntoResponse {
    page("Verify", "<div id=\"verify\"></div>")
}

async fn home(MaybeUser(user): MaybeUser) -> impl IntoResponse {
    page("Home", &greeting(user.as_ref()))
}

async fn profile(MaybeUser(user): MaybeUser) -> impl IntoResponse {
    page("Profile", &greeting(user.as_ref()))
}

async fn orders(MaybeUser(user): MaybeUser) -> impl IntoResponse {
    page("Orders", &greeting(user.as_ref()))
}

async fn dev_admin(MaybeUser(user): MaybeUser) -> impl IntoResponse {
    page("Developer console", &greeting(user.as_ref()))
}

pub fn router(auth: AuthBackend) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login))
        .route("/register", get(register))
        .route("/verify", get(verify))
        .route("/home", get(home))
        .route("/profile", get(profile))
        .route("/orders", get(orders))
        .route("/dev/admin", get(dev_admin))
        .route("/dev/admin/{*rest}", get(dev_admin))
        .with_state(auth)
}
