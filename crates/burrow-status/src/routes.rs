//! Request routing for the status API.

use serde_json::Value;

use crate::http::{Request, Response};
use crate::store::StatusStore;

/// Path of the status resource.
pub const STATUS_PATH: &str = "/api/v1/status";

/// Produces the response for `request`.
#[must_use]
pub fn handle(request: &Request, store: &StatusStore) -> Response {
    if request.path != STATUS_PATH {
        return Response::error(404, "Not found");
    }
    match request.method.as_str() {
        "GET" => Response::json(200, serde_json::json!({ "status": store.get() })),
        "POST" => update_status(&request.body, store),
        _ => Response::error(405, "Method not allowed"),
    }
}

fn update_status(body: &[u8], store: &StatusStore) -> Response {
    let data = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) | Err(_) => return Response::error(400, "Invalid JSON"),
        Ok(data) => data,
    };
    let Some(status) = data.get("status") else {
        return Response::error(400, "Missing 'status' key");
    };
    let status = match status {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    tracing::info!(status = %status, "status updated");
    store.set(status);
    Response::json(201, data)
}
