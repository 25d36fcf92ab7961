//! Response helpers: created-with-location and the meta count body.

use axum::{
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Count-only result of a meta query.
#[derive(Serialize)]
pub struct Meta {
    pub count: i64,
}

/// 201 Created with a Location header pointing at the new resource.
pub fn created(location: String, dto: serde_json::Value) -> Response {
    let mut response = (StatusCode::CREATED, Json(dto)).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_carries_location_and_201() {
        let resp = created("/api/invoices/inv-1".into(), json!({"id": "inv-1"}));
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            resp.headers().get(LOCATION).unwrap().to_str().unwrap(),
            "/api/invoices/inv-1"
        );
    }
}
