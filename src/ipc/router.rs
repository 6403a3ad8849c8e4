use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Family = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

/// Method families in dispatch order. The first one that recognises the
/// method answers it.
const FAMILIES: &[Family] = &[
    handlers::core::try_handle,
    handlers::session::try_handle,
    handlers::admin::try_handle,
    handlers::classrooms::try_handle,
    handlers::students::try_handle,
    handlers::report_cards::try_handle,
    handlers::subjects::try_handle,
    handlers::drafts::try_handle,
    handlers::delivery::try_handle,
    handlers::i18n::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let span = tracing::info_span!("request", method = %req.method, id = %req.id);
    let _enter = span.enter();

    let resp = FAMILIES
        .iter()
        .find_map(|family| family(state, &req))
        .unwrap_or_else(|| {
            err(
                &req.id,
                "not_implemented",
                format!("unknown method: {}", req.method),
                None,
            )
        });

    if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = resp
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::warn!(code, "request failed");
    } else {
        tracing::debug!("request ok");
    }
    resp
}
