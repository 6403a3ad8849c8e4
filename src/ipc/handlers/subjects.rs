use crate::i18n;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{current_locale, scoped, str_param};
use crate::ipc::types::{AppState, Request};
use crate::subjects::{self, SubjectCatalog};
use rusqlite::Connection;
use serde_json::json;

pub fn load_catalog(conn: &Connection, school_id: &str) -> Result<SubjectCatalog, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT subject FROM user_subjects WHERE school_id = ? ORDER BY sort_order, rowid",
    )?;
    let custom = stmt
        .query_map([school_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SubjectCatalog::new(custom))
}

fn catalog_json(conn: &Connection, catalog: &SubjectCatalog) -> serde_json::Value {
    let locale = current_locale(conn);
    let labels: serde_json::Map<String, serde_json::Value> = catalog
        .all()
        .into_iter()
        .map(|k| {
            let label = i18n::translate(locale, &k);
            (k, serde_json::Value::String(label))
        })
        .collect();
    json!({
        "predefined": catalog.predefined,
        "custom": catalog.custom,
        "all": catalog.all(),
        "labels": labels,
    })
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let catalog = load_catalog(conn, &session.school_id)?;
    Ok(catalog_json(conn, &catalog))
}

fn handle_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (key, result) = {
        let (conn, session) = scoped(state)?;
        let catalog = load_catalog(conn, &session.school_id)?;
        let key = catalog.check_new(str_param(req, "subject")?)?;
        conn.execute(
            "INSERT INTO user_subjects(school_id, subject, sort_order)
             VALUES(?1, ?2, (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM user_subjects WHERE school_id = ?1))",
            (&session.school_id, &key),
        )
        .map_err(|e| HandlerErr::insert("user_subjects", e))?;
        tracing::info!(school_id = %session.school_id, subject = %key, "custom subject added");
        let catalog = load_catalog(conn, &session.school_id)?;
        (key, catalog_json(conn, &catalog))
    };

    // A newly added subject starts selected in the open editor.
    let selected = state.draft.as_mut().map(|d| {
        d.select(&key);
        d.selected.clone()
    });
    Ok(json!({ "subject": key, "catalog": result, "draftSubjects": selected }))
}

fn handle_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (key, result) = {
        let (conn, session) = scoped(state)?;
        let catalog = load_catalog(conn, &session.school_id)?;
        let raw = str_param(req, "subject")?;
        let key = catalog.check_removable(raw).map_err(|e| {
            HandlerErr::from(e).with_details(json!({
                "subject": raw.trim(),
                "predefined": subjects::is_predefined(raw.trim()),
            }))
        })?;
        conn.execute(
            "DELETE FROM user_subjects WHERE school_id = ? AND subject = ?",
            (&session.school_id, &key),
        )
        .map_err(|e| HandlerErr::delete("user_subjects", e))?;
        tracing::info!(school_id = %session.school_id, subject = %key, "custom subject removed");
        let catalog = load_catalog(conn, &session.school_id)?;
        (key, catalog_json(conn, &catalog))
    };

    let selected = state.draft.as_mut().map(|d| {
        d.deselect(&key);
        d.selected.clone()
    });
    Ok(json!({ "subject": key, "catalog": result, "draftSubjects": selected }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "subjects.list" => handle_list(state, req),
        "subjects.add" => handle_add(state, req),
        "subjects.remove" => handle_remove(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
