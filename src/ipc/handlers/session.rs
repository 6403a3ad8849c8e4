use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::handlers::admin::{load_school, update_school, SchoolRow};
use crate::ipc::helpers::{opt_str_param, require_db, required_text, scoped};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;

fn handle_session_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let school_id = required_text(req, "schoolId")?;
    let school: SchoolRow = {
        let conn = require_db(state)?;
        load_school(conn, &school_id)?
    };
    if school.status != "active" {
        return Err(HandlerErr::new("account_suspended", "Account is suspended.")
            .with_details(json!({ "schoolId": school.id })));
    }

    // A different account must not inherit the previous editor draft.
    if state.session.as_ref().map(|s| s.school_id.as_str()) != Some(school.id.as_str()) {
        state.draft = None;
    }
    state.session = Some(Session {
        school_id: school.id.clone(),
        school_name: school.name.clone(),
    });
    tracing::info!(school_id = %school.id, "session opened");
    Ok(json!({ "school": school.to_json() }))
}

fn handle_session_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = None;
    state.draft = None;
    ok(&req.id, json!({ "ok": true }))
}

fn handle_session_me(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let Some(session) = state.session.as_ref() else {
        return Err(HandlerErr::new("no_session", "open a school session first"));
    };
    let school = load_school(conn, &session.school_id)?;
    Ok(json!({ "school": school.to_json() }))
}

/// Lets a signed-in school edit its own name and contact email.
fn handle_update_profile(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let updated = {
        let (conn, session) = scoped(state)?;
        let school = load_school(conn, &session.school_id)?;
        update_school(conn, &school, opt_str_param(req, "name"), opt_str_param(req, "email"))?
    };
    if let Some(session) = state.session.as_mut() {
        session.school_name = updated.name.clone();
    }
    tracing::info!(school_id = %updated.id, "school profile updated");
    Ok(json!({ "school": updated.to_json() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(respond(&req.id, handle_session_open(state, req))),
        "session.close" => Some(handle_session_close(state, req)),
        "session.me" => Some(respond(&req.id, handle_session_me(state, req))),
        "session.updateProfile" => Some(respond(&req.id, handle_update_profile(state, req))),
        _ => None,
    }
}
