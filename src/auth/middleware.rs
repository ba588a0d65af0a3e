use crate::auth::{
    carrier::{parse_cookie_header, parse_query, CredentialCarrier},
    CurrentUser, SharedAuth,
};
use axum::{
    http::{header, Request},
    middleware::Next,
    response::IntoResponse,
};
use std::collections::HashMap;

/// Create a HashMap with the content of the cookie header.
fn get_cookie_map<B>(req: &Request<B>) -> HashMap<String, String> {
    req.headers()
        .get(header::COOKIE)
        .and_then(|header| header.to_str().ok())
        .map(parse_cookie_header)
        .unwrap_or_default()
}

/// Collects the credentials a request carries in its query string and
/// cookies.
pub fn carrier_from_request<B>(req: &Request<B>, cookie_name: &str) -> CredentialCarrier {
    let params = parse_query(req.uri().query().unwrap_or(""));
    CredentialCarrier::from_named_values(&params, &get_cookie_map(req), cookie_name)
}

/// Attaches a [`CurrentUser`] to requests with valid credentials. Requests
/// without are passed on untouched; handlers decide whether they need a user.
pub async fn auth<B>(mut req: Request<B>, next: Next<B>, auth: SharedAuth) -> impl IntoResponse {
    let carrier = carrier_from_request(&req, &auth.settings.cookie_name);
    if let Some(user) = auth.authority.validate_request_identity(&carrier).await {
        tracing::debug!("authenticated request as '{}'", user.username);
        let current_user = CurrentUser::new(user, auth.settings.admin_id);
        req.extensions_mut().insert(current_user);
    }
    next.run(req).await
}
