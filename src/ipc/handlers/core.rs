use crate::archive::{ARCHIVE_MIME, DEFAULT_ARCHIVE_NAME};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "duplicatePolicy": state.config.duplicate_policy.as_str(),
            "archiveName": DEFAULT_ARCHIVE_NAME,
            "mime": ARCHIVE_MIME,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        _ => None,
    }
}
