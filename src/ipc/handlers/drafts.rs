use crate::draft::ReportCardDraft;
use crate::i18n::Locale;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::report_cards::{entry_json, load_saved_raw, persist_scores};
use crate::ipc::handlers::subjects::load_catalog;
use crate::ipc::helpers::{current_locale, owned_report_card, roster_ids, scoped, str_param};
use crate::ipc::types::{AppState, Request};
use crate::subjects::RESERVED_KEYS;
use serde_json::json;
use std::collections::HashMap;

fn no_draft() -> HandlerErr {
    HandlerErr::new("no_draft", "open a report card in the editor first")
}

fn draft_json(draft: &ReportCardDraft, locale: Locale) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = draft
        .preview()
        .iter()
        .map(|e| {
            entry_json(
                &e.student_id,
                &draft.selected,
                draft.scores.get(&e.student_id),
                Some((e.total, e.average, e.grade.code(), e.rank)),
                locale,
            )
        })
        .collect();
    json!({
        "reportCardId": draft.report_card_id,
        "subjects": draft.selected,
        "studentIds": draft.student_ids,
        "entries": entries,
        "dirty": draft.dirty,
    })
}

/// Current draft rendered with the workspace locale.
fn render(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = scoped(state)?;
    let draft = state.draft.as_ref().ok_or_else(no_draft)?;
    Ok(draft_json(draft, current_locale(conn)))
}

fn handle_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let draft = {
        let (conn, session) = scoped(state)?;
        let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
        let roster = roster_ids(conn, &rc.classroom_id)?;
        let saved = load_saved_raw(conn, &rc.id)?;
        ReportCardDraft::new(rc.id, roster, rc.subjects, saved)
    };
    if let Some(prev) = state.draft.as_ref().filter(|d| d.dirty) {
        tracing::warn!(report_card_id = %prev.report_card_id, "discarding unsaved draft");
    }
    state.draft = Some(draft);
    render(state)
}

fn handle_toggle_subject(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let key = {
        let (conn, session) = scoped(state)?;
        let draft = state.draft.as_ref().ok_or_else(no_draft)?;
        let key = str_param(req, "subject")?.trim().to_string();
        // A subject dropped from the catalog can still be deselected.
        let selected = draft.selected.contains(&key);
        if !selected && !load_catalog(conn, &session.school_id)?.contains(&key) {
            return Err(HandlerErr::not_found("subject").with_details(json!({ "subject": key })));
        }
        key
    };
    let draft = state.draft.as_mut().ok_or_else(no_draft)?;
    let selected = draft.toggle_subject(&key);
    let mut out = render(state)?;
    out["toggled"] = json!({ "subject": key, "selected": selected });
    Ok(out)
}

fn cell_value(req: &Request) -> Result<String, HandlerErr> {
    match req.params.get("value") {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_json::Value::Null) | None => Ok(String::new()),
        Some(_) => Err(HandlerErr::bad_params("value must be a string, number or null")),
    }
}

fn handle_set_score(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (student_id, field, value) = {
        let (conn, session) = scoped(state)?;
        let draft = state.draft.as_ref().ok_or_else(no_draft)?;
        let student_id = str_param(req, "studentId")?.to_string();
        let field = str_param(req, "field")?.trim().to_string();
        let value = cell_value(req)?;
        if field != "absent" {
            if RESERVED_KEYS.contains(&field.as_str()) {
                return Err(HandlerErr::bad_params("derived fields cannot be edited")
                    .with_details(json!({ "field": field })));
            }
            if !draft.selected.contains(&field)
                && !load_catalog(conn, &session.school_id)?.contains(&field)
            {
                return Err(HandlerErr::not_found("subject").with_details(json!({ "field": field })));
            }
        }
        (student_id, field, value)
    };

    let draft = state.draft.as_mut().ok_or_else(no_draft)?;
    if !draft.has_student(&student_id) {
        return Err(HandlerErr::not_found("student")
            .with_details(json!({ "studentId": student_id, "reportCardId": draft.report_card_id })));
    }
    draft.set_cell(&student_id, &field, &value);
    render(state)
}

fn handle_preview(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    render(state)
}

fn handle_save(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (report_card_id, subjects, entries) = {
        let (conn, session) = scoped(state)?;
        let draft = state.draft.as_ref().ok_or_else(no_draft)?;
        let rc = owned_report_card(conn, &session.school_id, &draft.report_card_id)?;

        // The roster may have shrunk since the draft was opened.
        let roster = roster_ids(conn, &rc.classroom_id)?;
        let incoming: HashMap<_, _> = draft
            .scores
            .iter()
            .filter(|(sid, _)| roster.contains(*sid))
            .map(|(sid, raw)| (sid.clone(), raw.clone()))
            .collect();
        let entries = persist_scores(conn, &rc, &draft.selected, &incoming)?;
        (rc.id, draft.selected.clone(), entries)
    };

    if let Some(d) = state.draft.as_mut() {
        d.dirty = false;
    }
    Ok(json!({ "reportCardId": report_card_id, "subjects": subjects, "entries": entries }))
}

fn handle_close(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let discarded = state.draft.take().map(|d| d.dirty).unwrap_or(false);
    Ok(json!({ "ok": true, "discardedChanges": discarded }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "draft.open" => handle_open(state, req),
        "draft.toggleSubject" => handle_toggle_subject(state, req),
        "draft.setScore" => handle_set_score(state, req),
        "draft.preview" => handle_preview(state, req),
        "draft.save" => handle_save(state, req),
        "draft.close" => handle_close(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
