use chrono::Utc;
use serde_json::json;
use tiny_http::Method;

use crate::error::ApiError;
use crate::server::{AppState, Incoming, Reply, apply, emails};

const KNOWN_PATHS: [&str; 4] = [
    "/api/apply",
    "/api/emails/sent",
    "/api/emails/senders",
    "/api/uptime",
];

pub fn dispatch(state: &AppState, req: &Incoming) -> Reply {
    let path = req.path.trim_end_matches('/');
    match (&req.method, path) {
        (Method::Post, "/api/apply") => apply::handle(state, req),
        (Method::Post, "/api/emails/sent") => emails::sent(state, req),
        (Method::Post, "/api/emails/senders") => emails::senders(state, req),
        (Method::Get, "/api/uptime") => uptime(state),
        (_, p) if KNOWN_PATHS.contains(&p) => ApiError::MethodNotAllowed.into(),
        _ => ApiError::NotFound.into(),
    }
}

fn uptime(state: &AppState) -> Reply {
    Reply::json(
        200,
        json!({
            "uptime": state.started.elapsed().as_secs_f64(),
            "status": "running",
            "timestamp": Utc::now().to_rfc3339(),
        }),
    )
}
