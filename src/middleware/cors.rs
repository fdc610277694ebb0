use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{config::AppConfig, middleware::request_id::REQUEST_ID_HEADER};

pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let headers = vec![
        ACCEPT,
        CONTENT_TYPE,
        HeaderName::from_static(REQUEST_ID_HEADER),
    ];

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

    if config.cors_origins.iter().any(|origin| origin.trim() == "*") {
        layer.allow_origin(Any).allow_credentials(false)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect::<Vec<_>>();
        layer.allow_origin(origins).allow_credentials(true)
    }
}
