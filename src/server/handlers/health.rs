use axum::extract::Json;
use serde_json::{json, Value};

pub async fn check() -> Json<Value> {
    json!({"status": "healthy", "service": "dispatch"}).into()
}

pub async fn check_geo() -> Json<Value> {
    json!({"status": "healthy", "service": "dispatch", "endpoint": "api/v1/geo"}).into()
}
