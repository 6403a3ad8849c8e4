use crate::calc::{self, Grade, RawScores};
use crate::i18n::{self, Locale};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::subjects::load_catalog;
use crate::ipc::helpers::{
    current_locale, load_report_card, now_rfc3339, owned_classroom, owned_report_card,
    require_db, required_text, roster_ids, scoped, str_list_param, str_param, ReportCardRow,
};
use crate::ipc::types::{AppState, Request};
use crate::subjects::{self, SubjectCatalog};
use crate::tokens;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Stored raw inputs of every saved row of a report card.
pub fn load_saved_raw(
    conn: &Connection,
    report_card_id: &str,
) -> Result<HashMap<String, RawScores>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT student_id, absent, raw_json FROM report_card_scores WHERE report_card_id = ?",
    )?;
    let rows = stmt
        .query_map([report_card_id], |r| {
            let student_id: String = r.get(0)?;
            let absent: Option<String> = r.get(1)?;
            let raw_json: String = r.get(2)?;
            Ok((student_id, absent, raw_json))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = HashMap::with_capacity(rows.len());
    for (student_id, absent, raw_json) in rows {
        let values: HashMap<String, String> = serde_json::from_str(&raw_json).unwrap_or_else(|e| {
            tracing::warn!(%student_id, error = %e, "unreadable stored raw scores; treating as empty");
            HashMap::new()
        });
        out.insert(student_id, RawScores { absent, values });
    }
    Ok(out)
}

fn cell_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Parses `{studentId: {absent, <subjectKey>: raw, ...}}`. Derived fields
/// sent by the client are dropped; they are always recomputed.
pub fn parse_incoming_scores(
    v: Option<&serde_json::Value>,
) -> Result<HashMap<String, RawScores>, HandlerErr> {
    let Some(obj) = v.and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("scores must be an object keyed by studentId"));
    };
    let mut out = HashMap::with_capacity(obj.len());
    for (student_id, row) in obj {
        let Some(cells) = row.as_object() else {
            return Err(HandlerErr::bad_params("each scores row must be an object")
                .with_details(json!({ "studentId": student_id })));
        };
        let mut raw = RawScores::default();
        for (key, cell) in cells {
            let Some(s) = cell_to_string(cell) else {
                return Err(HandlerErr::bad_params("score cells must be strings, numbers or null")
                    .with_details(json!({ "studentId": student_id, "field": key })));
            };
            match key.as_str() {
                "absent" => raw.absent = Some(s),
                k if subjects::RESERVED_KEYS.contains(&k) => {}
                _ => {
                    raw.values.insert(key.clone(), s);
                }
            }
        }
        out.insert(student_id.clone(), raw);
    }
    Ok(out)
}

fn grade_label(locale: Locale, grade_code: &str) -> String {
    match Grade::from_code(grade_code) {
        Some(g) => i18n::translate(locale, g.message_key()),
        None => grade_code.to_string(),
    }
}

/// Selected-subject cells of a row, in subject order.
fn subject_cells(subjects: &[String], raw: Option<&RawScores>) -> serde_json::Map<String, serde_json::Value> {
    subjects
        .iter()
        .map(|s| {
            let v = raw.and_then(|r| r.get(s)).unwrap_or("").to_string();
            (s.clone(), serde_json::Value::String(v))
        })
        .collect()
}

pub fn entry_json(
    student_id: &str,
    subjects: &[String],
    raw: Option<&RawScores>,
    derived: Option<(f64, f64, &str, i64)>,
    locale: Locale,
) -> serde_json::Value {
    let absent = raw.and_then(|r| r.absent.clone()).unwrap_or_default();
    match derived {
        Some((total, average, grade, rank)) => json!({
            "studentId": student_id,
            "absent": absent,
            "scores": subject_cells(subjects, raw),
            "total": total,
            "average": average,
            "grade": grade,
            "gradeLabel": grade_label(locale, grade),
            "rank": rank,
        }),
        None => json!({
            "studentId": student_id,
            "absent": absent,
            "scores": subject_cells(subjects, raw),
            "total": null,
            "average": null,
            "grade": null,
            "gradeLabel": null,
            "rank": null,
        }),
    }
}

/// Writes the subject selection, merges `incoming` over the saved raw
/// inputs and recomputes every roster row before storing it.
pub fn persist_scores(
    conn: &Connection,
    rc: &ReportCardRow,
    subjects: &[String],
    incoming: &HashMap<String, RawScores>,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let roster = roster_ids(conn, &rc.classroom_id)?;
    for sid in incoming.keys() {
        if !roster.iter().any(|r| r == sid) {
            return Err(HandlerErr::bad_params("student is not on this classroom roster")
                .with_details(json!({ "studentId": sid })));
        }
    }

    let mut raw = load_saved_raw(conn, &rc.id)?;
    for (sid, row) in incoming {
        raw.entry(sid.clone()).or_default().merge_from(row);
    }
    let computed = calc::compute_report(&roster, subjects, &raw);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE report_cards SET subjects_json = ? WHERE id = ?",
        (json!(subjects).to_string(), &rc.id),
    )
    .map_err(|e| HandlerErr::update("report_cards", e))?;

    let now = now_rfc3339();
    for entry in &computed {
        let row = raw.get(&entry.student_id);
        let values_json = json!(row.map(|r| r.values.clone()).unwrap_or_default()).to_string();
        tx.execute(
            "INSERT INTO report_card_scores(
                report_card_id, student_id, absent, raw_json, total, average, grade, rank, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(report_card_id, student_id) DO UPDATE SET
               absent = excluded.absent,
               raw_json = excluded.raw_json,
               total = excluded.total,
               average = excluded.average,
               grade = excluded.grade,
               rank = excluded.rank,
               updated_at = excluded.updated_at",
            (
                &rc.id,
                &entry.student_id,
                row.and_then(|r| r.absent.clone()),
                values_json,
                entry.total,
                entry.average,
                entry.grade.code(),
                entry.rank,
                &now,
            ),
        )
        .map_err(|e| HandlerErr::insert("report_card_scores", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(
        report_card_id = %rc.id,
        students = computed.len(),
        subjects = subjects.len(),
        "report card scores recomputed"
    );

    let locale = current_locale(conn);
    Ok(computed
        .iter()
        .map(|e| {
            entry_json(
                &e.student_id,
                subjects,
                raw.get(&e.student_id),
                Some((e.total, e.average, e.grade.code(), e.rank)),
                locale,
            )
        })
        .collect())
}

pub fn has_saved_rows(conn: &Connection, report_card_id: &str) -> Result<bool, HandlerErr> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM report_card_scores WHERE report_card_id = ?",
        [report_card_id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Re-derives the stored rows of every scored report card of a classroom.
/// Ranks depend on the whole roster, so every roster change ends here.
pub fn recompute_classroom(conn: &Connection, classroom_id: &str) -> Result<(), HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT rc.id FROM report_cards rc
         JOIN report_card_scores s ON s.report_card_id = rc.id
         WHERE rc.classroom_id = ?",
    )?;
    let ids = stmt
        .query_map([classroom_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for id in ids {
        if let Some(rc) = load_report_card(conn, &id)? {
            persist_scores(conn, &rc, &rc.subjects, &HashMap::new())?;
        }
    }
    Ok(())
}

/// Runs after any roster edit: re-derives the stored rows of the touched
/// classrooms and moves an open draft of one of them onto the new roster.
pub fn roster_changed(state: &mut AppState, classroom_ids: &[String]) -> Result<(), HandlerErr> {
    let new_roster = {
        let conn = require_db(state)?;
        for id in classroom_ids {
            recompute_classroom(conn, id)?;
        }
        match state.draft.as_ref() {
            Some(draft) => match load_report_card(conn, &draft.report_card_id)? {
                Some(rc) if classroom_ids.contains(&rc.classroom_id) => {
                    Some(roster_ids(conn, &rc.classroom_id)?)
                }
                _ => None,
            },
            None => None,
        }
    };
    if let (Some(roster), Some(draft)) = (new_roster, state.draft.as_mut()) {
        draft.set_roster(roster);
    }
    Ok(())
}

/// Every key must be in the school's catalog, except keys the card
/// already selects (a custom subject removed after it was picked).
pub fn check_selection(
    catalog: &SubjectCatalog,
    selected: &[String],
    kept: &[String],
) -> Result<(), HandlerErr> {
    let unknown: Vec<&String> = selected
        .iter()
        .filter(|k| !catalog.contains(k) && !kept.contains(k))
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(HandlerErr::bad_params("unknown subject")
            .with_details(json!({ "unknownSubjects": unknown })))
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    let mut stmt = conn.prepare(
        "SELECT id FROM report_cards WHERE classroom_id = ? ORDER BY created_at DESC, rowid DESC",
    )?;
    let ids = stmt
        .query_map([&c.id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut cards = Vec::with_capacity(ids.len());
    for id in ids {
        cards.push(owned_report_card(conn, &session.school_id, &id)?.to_json());
    }
    Ok(json!({ "classroomId": c.id, "reportCards": cards }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
    Ok(json!({ "reportCard": rc.to_json() }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    let title = required_text(req, "title")?;
    let selected = match str_list_param(req, "subjects")? {
        Some(list) => {
            let selected = subjects::normalize_selection(list);
            check_selection(&load_catalog(conn, &session.school_id)?, &selected, &[])?;
            selected
        }
        None => subjects::predefined(),
    };

    let report_card_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO report_cards(id, classroom_id, title, subjects_json, created_at, created_by)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &report_card_id,
            &c.id,
            &title,
            json!(selected).to_string(),
            now_rfc3339(),
            &session.school_name,
        ),
    )
    .map_err(|e| HandlerErr::insert("report_cards", e))?;

    let rc = owned_report_card(conn, &session.school_id, &report_card_id)?;
    Ok(json!({ "reportCardId": report_card_id, "reportCard": rc.to_json() }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let report_card_id = {
        let (conn, session) = scoped(state)?;
        let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
        let steps: [(&str, &str); 4] = [
            ("sms_outbox", "DELETE FROM sms_outbox WHERE report_card_id = ?1"),
            ("share_tokens", "DELETE FROM share_tokens WHERE report_card_id = ?1"),
            (
                "report_card_scores",
                "DELETE FROM report_card_scores WHERE report_card_id = ?1",
            ),
            ("report_cards", "DELETE FROM report_cards WHERE id = ?1"),
        ];
        for (table, sql) in steps {
            tx.execute(sql, [&rc.id])
                .map_err(|e| HandlerErr::delete(table, e))?;
        }
        tx.commit()
            .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
        rc.id
    };

    if state.draft.as_ref().map(|d| d.report_card_id.as_str()) == Some(report_card_id.as_str()) {
        state.draft = None;
    }
    Ok(json!({ "ok": true }))
}

fn handle_subjects_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (report_card_id, selected) = {
        let (conn, session) = scoped(state)?;
        let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
        let Some(list) = str_list_param(req, "subjects")? else {
            return Err(HandlerErr::bad_params("missing subjects"));
        };
        let selected = subjects::normalize_selection(list);
        check_selection(&load_catalog(conn, &session.school_id)?, &selected, &rc.subjects)?;
        if has_saved_rows(conn, &rc.id)? {
            persist_scores(conn, &rc, &selected, &HashMap::new())?;
        } else {
            conn.execute(
                "UPDATE report_cards SET subjects_json = ? WHERE id = ?",
                (json!(selected).to_string(), &rc.id),
            )
            .map_err(|e| HandlerErr::update("report_cards", e))?;
        }
        (rc.id, selected)
    };

    if let Some(draft) = state.draft.as_mut() {
        if draft.report_card_id == report_card_id {
            draft.selected = selected.clone();
        }
    }
    Ok(json!({ "reportCardId": report_card_id, "subjects": selected }))
}

fn handle_scores_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
    let roster = roster_ids(conn, &rc.classroom_id)?;
    let raw = load_saved_raw(conn, &rc.id)?;

    let mut stmt = conn.prepare(
        "SELECT student_id, total, average, grade, rank FROM report_card_scores
         WHERE report_card_id = ?",
    )?;
    let derived: HashMap<String, (f64, f64, String, i64)> = stmt
        .query_map([&rc.id], |r| {
            let student_id: String = r.get(0)?;
            let total: f64 = r.get(1)?;
            let average: f64 = r.get(2)?;
            let grade: String = r.get(3)?;
            let rank: i64 = r.get(4)?;
            Ok((student_id, (total, average, grade, rank)))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let locale = current_locale(conn);
    let entries: Vec<serde_json::Value> = roster
        .iter()
        .map(|sid| {
            let d = derived
                .get(sid)
                .map(|(t, a, g, r)| (*t, *a, g.as_str(), *r));
            entry_json(sid, &rc.subjects, raw.get(sid), d, locale)
        })
        .collect();
    Ok(json!({ "reportCardId": rc.id, "subjects": rc.subjects, "entries": entries }))
}

fn handle_scores_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
    let selected = match str_list_param(req, "subjects")? {
        Some(list) => {
            let selected = subjects::normalize_selection(list);
            check_selection(&load_catalog(conn, &session.school_id)?, &selected, &rc.subjects)?;
            selected
        }
        None => rc.subjects.clone(),
    };
    let incoming = parse_incoming_scores(req.params.get("scores"))?;
    let entries = persist_scores(conn, &rc, &selected, &incoming)?;
    Ok(json!({ "reportCardId": rc.id, "subjects": selected, "entries": entries }))
}

fn fill_template(template: &str, student: &str, title: &str, link: &str) -> String {
    template
        .replace("{student}", student)
        .replace("{title}", title)
        .replace("{link}", link)
}

fn handle_send_sms(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let runtime = &state.runtime;
    let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
    let roster = roster_ids(conn, &rc.classroom_id)?;

    let targets = match str_list_param(req, "studentIds")? {
        Some(list) if !list.is_empty() => {
            for sid in &list {
                if !roster.iter().any(|r| r == sid) {
                    return Err(HandlerErr::bad_params("student is not on this classroom roster")
                        .with_details(json!({ "studentId": sid })));
                }
            }
            list
        }
        _ => roster.clone(),
    };

    // A link is only worth sending once the student has a saved row.
    let mut stmt =
        conn.prepare("SELECT student_id FROM report_card_scores WHERE report_card_id = ?")?;
    let scored = stmt
        .query_map([&rc.id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let locale = current_locale(conn);
    let template = i18n::translate(locale, "smsReportBody");
    let issued = chrono::Utc::now();
    let expires = tokens::expires_at(issued, runtime.token_ttl_days);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut queued: Vec<serde_json::Value> = Vec::new();
    let mut skipped: Vec<serde_json::Value> = Vec::new();
    for sid in &targets {
        if !scored.contains(sid) {
            skipped.push(json!({ "studentId": sid, "reason": "no_scores" }));
            continue;
        }
        let (name, phone): (String, String) = tx.query_row(
            "SELECT name, guardian_phone FROM students WHERE id = ?",
            [sid],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let phone = phone.trim().to_string();
        if phone.is_empty() {
            skipped.push(json!({ "studentId": sid, "reason": "no_phone" }));
            continue;
        }

        let token = tokens::new_token();
        tx.execute(
            "INSERT INTO share_tokens(token_digest, report_card_id, student_id, issued_at, expires_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                tokens::digest(&token),
                &rc.id,
                sid,
                issued.to_rfc3339(),
                expires.to_rfc3339(),
            ),
        )
        .map_err(|e| HandlerErr::insert("share_tokens", e))?;

        let link = tokens::report_link(&runtime.public_url, &token);
        let body = fill_template(&template, &name, &rc.title, &link);
        let message_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO sms_outbox(id, report_card_id, student_id, phone, body, link, status, queued_at)
             VALUES(?, ?, ?, ?, ?, ?, 'queued', ?)",
            (&message_id, &rc.id, sid, &phone, &body, &link, issued.to_rfc3339()),
        )
        .map_err(|e| HandlerErr::insert("sms_outbox", e))?;

        queued.push(json!({
            "messageId": message_id,
            "studentId": sid,
            "phone": phone,
            "link": link,
        }));
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(
        report_card_id = %rc.id,
        queued = queued.len(),
        skipped = skipped.len(),
        "report links queued for SMS"
    );
    Ok(json!({ "queued": queued, "skipped": skipped, "expiresAt": expires.to_rfc3339() }))
}

fn handle_sms_outbox(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let rc = owned_report_card(conn, &session.school_id, str_param(req, "reportCardId")?)?;
    let mut stmt = conn.prepare(
        "SELECT id, student_id, phone, body, link, status, queued_at
         FROM sms_outbox WHERE report_card_id = ?
         ORDER BY queued_at, rowid",
    )?;
    let messages = stmt
        .query_map([&rc.id], |r| {
            let id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let phone: String = r.get(2)?;
            let body: String = r.get(3)?;
            let link: String = r.get(4)?;
            let status: String = r.get(5)?;
            let queued_at: String = r.get(6)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "phone": phone,
                "body": body,
                "link": link,
                "status": status,
                "queuedAt": queued_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "reportCardId": rc.id, "messages": messages }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "reportCards.list" => handle_list(state, req),
        "reportCards.get" => handle_get(state, req),
        "reportCards.create" => handle_create(state, req),
        "reportCards.delete" => handle_delete(state, req),
        "reportCards.subjects.set" => handle_subjects_set(state, req),
        "reportCards.scores.get" => handle_scores_get(state, req),
        "reportCards.scores.save" => handle_scores_save(state, req),
        "reportCards.sendSms" => handle_send_sms(state, req),
        "reportCards.smsOutbox" => handle_sms_outbox(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
