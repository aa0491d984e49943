//! HTTP middleware shared by every route.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::core::logging::{generate_request_id, sanitize_request_id, REQUEST_ID, REQUEST_ID_HEADER};

/// Extension type carrying the request id for handlers.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Assign a request id and keep it in scope for the whole request.
///
/// A well-formed inbound `X-Request-ID` is reused so that ids chain across
/// services; otherwise a fresh UUID is generated. The id is echoed on the
/// response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(sanitize_request_id)
        .unwrap_or_else(generate_request_id);

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = REQUEST_ID.scope(request_id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}
