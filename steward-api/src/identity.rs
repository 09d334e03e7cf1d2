use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

/// Who is making the request, recorded on every apply.
///
/// Steward is meant to sit behind an authenticating proxy that sets
/// `x-steward-user` (or the oauth2-proxy style `x-forwarded-user`). The
/// bare `x-user` header is accepted for local development.
#[derive(Clone, Debug)]
pub struct Identity {
    pub username: String,
}

pub async fn identity_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let username = req
        .headers()
        .get("x-steward-user")
        .or_else(|| req.headers().get("x-forwarded-user"))
        .or_else(|| req.headers().get("x-user"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let username = username.ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Identity { username });

    Ok(next.run(req).await)
}
