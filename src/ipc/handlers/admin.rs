use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{now_rfc3339, opt_str_param, require_db, required_text, str_param};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchoolRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: String,
    pub created_at: String,
}

impl SchoolRow {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "status": self.status,
            "createdAt": self.created_at,
        })
    }
}

fn school_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<SchoolRow> {
    Ok(SchoolRow {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        status: r.get(3)?,
        created_at: r.get(4)?,
    })
}

pub fn load_school(conn: &Connection, school_id: &str) -> Result<SchoolRow, HandlerErr> {
    conn.query_row(
        "SELECT id, name, email, status, created_at FROM schools WHERE id = ?",
        [school_id],
        school_from_row,
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("school").with_details(json!({ "schoolId": school_id })))
}

fn list_schools(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, status, created_at FROM schools ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([], school_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.iter().map(SchoolRow::to_json).collect())
}

fn normalized_email(raw: &str) -> Result<(String, String), HandlerErr> {
    let email = raw.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(HandlerErr::bad_params("email must be a valid address")
            .with_details(json!({ "email": raw })));
    }
    let norm = email.to_lowercase();
    Ok((email, norm))
}

fn ensure_email_free(
    conn: &Connection,
    email_norm: &str,
    except_id: Option<&str>,
) -> Result<(), HandlerErr> {
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM schools WHERE email_norm = ?",
            [email_norm],
            |r| r.get(0),
        )
        .optional()?;
    match taken {
        Some(id) if Some(id.as_str()) != except_id => Err(HandlerErr::new(
            "duplicate_email",
            "a school with this email already exists",
        )
        .with_details(json!({ "email": email_norm }))),
        _ => Ok(()),
    }
}

fn handle_schools_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    Ok(json!({ "schools": list_schools(conn)? }))
}

fn handle_schools_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let school = load_school(conn, str_param(req, "schoolId")?)?;
    Ok(json!({ "school": school.to_json() }))
}

fn handle_schools_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_text(req, "name")?;
    let (email, email_norm) = normalized_email(str_param(req, "email")?)?;
    ensure_email_free(conn, &email_norm, None)?;

    let school_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schools(id, name, email, email_norm, status, created_at)
         VALUES(?, ?, ?, ?, 'active', ?)",
        (&school_id, &name, &email, &email_norm, now_rfc3339()),
    )
    .map_err(|e| HandlerErr::insert("schools", e))?;

    tracing::info!(school_id = %school_id, "school account created");
    Ok(json!({ "schoolId": school_id, "name": name, "email": email }))
}

/// Applies a partial name/email edit to a school row and returns the result.
pub fn update_school(
    conn: &Connection,
    school: &SchoolRow,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<SchoolRow, HandlerErr> {
    let name = match name {
        Some(raw) => {
            let v = raw.trim().to_string();
            if v.is_empty() {
                return Err(HandlerErr::bad_params("name must not be empty"));
            }
            v
        }
        None => school.name.clone(),
    };
    let (email, email_norm) = match email {
        Some(raw) => normalized_email(raw)?,
        None => (school.email.clone(), school.email.to_lowercase()),
    };
    ensure_email_free(conn, &email_norm, Some(&school.id))?;

    conn.execute(
        "UPDATE schools SET name = ?, email = ?, email_norm = ? WHERE id = ?",
        (&name, &email, &email_norm, &school.id),
    )
    .map_err(|e| HandlerErr::update("schools", e))?;

    load_school(conn, &school.id)
}

fn handle_schools_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let updated = {
        let conn = require_db(state)?;
        let school = load_school(conn, str_param(req, "schoolId")?)?;
        update_school(conn, &school, opt_str_param(req, "name"), opt_str_param(req, "email"))?
    };
    // Keep the session's display name (report card authorship) current.
    if let Some(session) = state.session.as_mut().filter(|s| s.school_id == updated.id) {
        session.school_name = updated.name.clone();
    }
    Ok(json!({ "school": updated.to_json() }))
}

fn handle_schools_set_status(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let school_id = {
        let conn = require_db(state)?;
        let school = load_school(conn, str_param(req, "schoolId")?)?;
        let status = str_param(req, "status")?.trim().to_ascii_lowercase();
        if status != "active" && status != "deactivated" {
            return Err(HandlerErr::bad_params("status must be one of: active, deactivated")
                .with_details(json!({ "status": status })));
        }
        conn.execute(
            "UPDATE schools SET status = ? WHERE id = ?",
            (&status, &school.id),
        )
        .map_err(|e| HandlerErr::update("schools", e))?;
        if status == "deactivated" {
            Some(school.id)
        } else {
            None
        }
    };

    if let Some(id) = school_id.as_deref() {
        if state.session.as_ref().map(|s| s.school_id.as_str()) == Some(id) {
            tracing::info!(school_id = %id, "session closed: school deactivated");
            state.session = None;
            state.draft = None;
        }
    }

    let conn = require_db(state)?;
    let school = load_school(conn, str_param(req, "schoolId")?)?;
    Ok(json!({ "school": school.to_json() }))
}

fn handle_schools_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let school_id = {
        let conn = require_db(state)?;
        let school = load_school(conn, str_param(req, "schoolId")?)?;

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

        // Explicit dependency order (no ON DELETE CASCADE).
        let steps: [(&str, &str); 9] = [
            (
                "sms_outbox",
                "DELETE FROM sms_outbox WHERE report_card_id IN (
                   SELECT rc.id FROM report_cards rc
                   JOIN classrooms c ON c.id = rc.classroom_id
                   WHERE c.school_id = ?1)",
            ),
            (
                "share_tokens",
                "DELETE FROM share_tokens WHERE report_card_id IN (
                   SELECT rc.id FROM report_cards rc
                   JOIN classrooms c ON c.id = rc.classroom_id
                   WHERE c.school_id = ?1)",
            ),
            (
                "report_card_scores",
                "DELETE FROM report_card_scores WHERE report_card_id IN (
                   SELECT rc.id FROM report_cards rc
                   JOIN classrooms c ON c.id = rc.classroom_id
                   WHERE c.school_id = ?1)",
            ),
            (
                "report_cards",
                "DELETE FROM report_cards WHERE classroom_id IN (
                   SELECT id FROM classrooms WHERE school_id = ?1)",
            ),
            (
                "classroom_students",
                "DELETE FROM classroom_students WHERE classroom_id IN (
                   SELECT id FROM classrooms WHERE school_id = ?1)",
            ),
            ("classrooms", "DELETE FROM classrooms WHERE school_id = ?1"),
            ("user_subjects", "DELETE FROM user_subjects WHERE school_id = ?1"),
            ("students", "DELETE FROM students WHERE school_id = ?1"),
            ("schools", "DELETE FROM schools WHERE id = ?1"),
        ];
        for (table, sql) in steps {
            tx.execute(sql, [&school.id])
                .map_err(|e| HandlerErr::delete(table, e))?;
        }
        tx.commit()
            .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
        school.id
    };

    if state.session.as_ref().map(|s| s.school_id.as_str()) == Some(school_id.as_str()) {
        state.session = None;
        state.draft = None;
    }
    tracing::info!(school_id = %school_id, "school account deleted");
    Ok(json!({ "ok": true }))
}

fn handle_dashboard(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let (total, active): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0)
         FROM schools",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(json!({
        "stats": {
            "total": total,
            "active": active,
            "deactivated": total - active,
        },
        "schools": list_schools(conn)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "admin.schools.list" => handle_schools_list(state, req),
        "admin.schools.get" => handle_schools_get(state, req),
        "admin.schools.create" => handle_schools_create(state, req),
        "admin.schools.update" => handle_schools_update(state, req),
        "admin.schools.setStatus" => handle_schools_set_status(state, req),
        "admin.schools.delete" => handle_schools_delete(state, req),
        "admin.dashboard" => handle_dashboard(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
