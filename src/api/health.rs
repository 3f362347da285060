use serde_json::{json, Value};

use super::response::ApiResponse;

pub async fn health_check() -> ApiResponse<Value> {
    ApiResponse::ok("OK", json!({ "status": "ok" }))
}
