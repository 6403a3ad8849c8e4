use crate::i18n::{self, Locale};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::report_cards::{entry_json, load_saved_raw};
use crate::ipc::handlers::students::{student_from_row, STUDENT_COLUMNS};
use crate::ipc::helpers::{current_locale, load_report_card, opt_str_param, require_db, roster_ids};
use crate::ipc::types::{AppState, Request};
use crate::tokens;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Every lookup failure looks the same to the link holder.
fn invalid_link() -> HandlerErr {
    HandlerErr::new("invalid_link", i18n::translate(Locale::En, "invalidLink"))
}

struct TokenRow {
    report_card_id: String,
    student_id: String,
    expires_at: String,
}

fn lookup_token(conn: &Connection, token: &str) -> Result<Option<TokenRow>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT report_card_id, student_id, expires_at FROM share_tokens WHERE token_digest = ?",
            [tokens::digest(token)],
            |r| {
                Ok(TokenRow {
                    report_card_id: r.get(0)?,
                    student_id: r.get(1)?,
                    expires_at: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn resolve(conn: &Connection, token: &str) -> Result<serde_json::Value, HandlerErr> {
    if !tokens::looks_like_token(token) {
        return Err(invalid_link());
    }
    let Some(tok) = lookup_token(conn, token)? else {
        return Err(invalid_link());
    };
    if !tokens::is_live(&tok.expires_at, chrono::Utc::now()) {
        return Err(invalid_link());
    }
    let Some(rc) = load_report_card(conn, &tok.report_card_id)? else {
        return Err(invalid_link());
    };

    let student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students s WHERE s.id = ?"),
            [&tok.student_id],
            student_from_row,
        )
        .optional()?
        .ok_or_else(invalid_link)?;

    // A student who left the classroom no longer has a place in its ranking.
    let roster = roster_ids(conn, &rc.classroom_id)?;
    if !roster.iter().any(|sid| sid == &tok.student_id) {
        return Err(invalid_link());
    }

    let derived: Option<(f64, f64, String, i64)> = conn
        .query_row(
            "SELECT total, average, grade, rank FROM report_card_scores
             WHERE report_card_id = ? AND student_id = ?",
            (&rc.id, &tok.student_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((total, average, grade, rank)) = derived else {
        return Err(invalid_link());
    };

    let raw = load_saved_raw(conn, &rc.id)?;
    let score = entry_json(
        &tok.student_id,
        &rc.subjects,
        raw.get(&tok.student_id),
        Some((total, average, grade.as_str(), rank)),
        current_locale(conn),
    );
    let total_students = roster.len();

    Ok(json!({
        "reportCard": { "id": rc.id, "title": rc.title },
        "student": {
            "id": student["id"],
            "name": student["name"],
            "gender": student["gender"],
            "studentCode": student["studentCode"],
            "photo": student["photo"],
        },
        "score": score,
        "subjects": rc.subjects,
        "totalStudents": total_students,
    }))
}

fn handle_by_token(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let token = opt_str_param(req, "token").unwrap_or("").trim();
    resolve(conn, token).map_err(|e| {
        if e.code != "invalid_link" {
            tracing::warn!(error = %e, "report link lookup failed");
        }
        invalid_link()
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "report.byToken" => Some(respond(&req.id, handle_by_token(state, req))),
        _ => None,
    }
}
