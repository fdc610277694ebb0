use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuses a sane client-supplied request id or mints one, and echoes it on
/// the response.
pub async fn inject_request_id(mut request: Request<Body>, next: Next) -> Response {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    let request_id = request
        .headers()
        .get(&header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Ok(header_value) = HeaderValue::from_str(&request_id) else {
        return next.run(request).await;
    };
    request.headers_mut().insert(header.clone(), header_value.clone());

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;
    response.headers_mut().insert(header, header_value);
    response
}
