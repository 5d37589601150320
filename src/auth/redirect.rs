// Redirect responses that understand asynchronous (HTMX-style) clients

use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

/// Request marker sent by asynchronous clients
pub const HX_REQUEST: HeaderName = HeaderName::from_static("hx-request");

/// Response header such clients follow instead of a native redirect
pub const HX_REDIRECT: HeaderName = HeaderName::from_static("hx-redirect");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// 303 See Other
    SeeOther,
    /// 307 Temporary Redirect
    Temporary,
}

pub fn is_async_client(headers: &HeaderMap) -> bool {
    headers
        .get(&HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "true")
}

/// Redirect to `url`, answering asynchronous clients with `303` and `HX-Redirect`
pub fn redirect_response(headers: &HeaderMap, url: &str, kind: RedirectKind) -> Response {
    if is_async_client(headers) {
        return (StatusCode::SEE_OTHER, [(HX_REDIRECT, url)]).into_response();
    }

    match kind {
        RedirectKind::SeeOther => Redirect::to(url).into_response(),
        RedirectKind::Temporary => Redirect::temporary(url).into_response(),
    }
}
