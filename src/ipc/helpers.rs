use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::db;
use crate::i18n::Locale;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request, Session};

pub const LOCALE_SETTING: &str = "ui.locale";

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Connection plus the open school session, for school-scoped methods.
pub fn scoped(state: &AppState) -> Result<(&Connection, &Session), HandlerErr> {
    let conn = require_db(state)?;
    let session = state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_session", "open a school session first"))?;
    Ok((conn, session))
}

pub fn str_param<'a>(req: &'a Request, name: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {name}")))
}

pub fn opt_str_param<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.params.get(name).and_then(|v| v.as_str())
}

/// Trimmed, non-empty string param.
pub fn required_text(req: &Request, name: &str) -> Result<String, HandlerErr> {
    let v = str_param(req, name)?.trim().to_string();
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{name} must not be empty")));
    }
    Ok(v)
}

pub fn str_list_param(req: &Request, name: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = req.params.get(name) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{name} must be an array")));
    };
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        match item.as_str() {
            Some(s) => out.push(s.to_string()),
            None => {
                return Err(HandlerErr::bad_params(format!(
                    "{name} must contain only strings"
                )))
            }
        }
    }
    Ok(Some(out))
}

#[derive(Debug, Clone)]
pub struct ClassroomRow {
    pub id: String,
    pub name: String,
    pub color: String,
    pub archived: bool,
}

pub fn owned_classroom(
    conn: &Connection,
    school_id: &str,
    classroom_id: &str,
) -> Result<ClassroomRow, HandlerErr> {
    conn.query_row(
        "SELECT id, name, color, archived FROM classrooms WHERE id = ? AND school_id = ?",
        (classroom_id, school_id),
        |r| {
            Ok(ClassroomRow {
                id: r.get(0)?,
                name: r.get(1)?,
                color: r.get(2)?,
                archived: r.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()?
    .ok_or_else(|| {
        HandlerErr::not_found("classroom").with_details(json!({ "classroomId": classroom_id }))
    })
}

pub fn ensure_owned_student(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
) -> Result<(), HandlerErr> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND school_id = ?",
            (student_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(HandlerErr::not_found("student").with_details(json!({ "studentId": student_id }))),
    }
}

#[derive(Debug, Clone)]
pub struct ReportCardRow {
    pub id: String,
    pub classroom_id: String,
    pub title: String,
    pub subjects: Vec<String>,
    pub created_at: String,
    pub created_by: String,
}

impl ReportCardRow {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "classroomId": self.classroom_id,
            "title": self.title,
            "subjects": self.subjects,
            "createdAt": self.created_at,
            "createdBy": self.created_by,
        })
    }
}

pub fn parse_subjects_json(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
}

/// Loads a report card without any ownership check. Used by token lookups.
pub fn load_report_card(conn: &Connection, report_card_id: &str) -> Result<Option<ReportCardRow>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, classroom_id, title, subjects_json, created_at, created_by
             FROM report_cards WHERE id = ?",
            [report_card_id],
            |r| {
                let subjects_json: String = r.get(3)?;
                Ok(ReportCardRow {
                    id: r.get(0)?,
                    classroom_id: r.get(1)?,
                    title: r.get(2)?,
                    subjects: parse_subjects_json(&subjects_json),
                    created_at: r.get(4)?,
                    created_by: r.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn owned_report_card(
    conn: &Connection,
    school_id: &str,
    report_card_id: &str,
) -> Result<ReportCardRow, HandlerErr> {
    let not_found = || {
        HandlerErr::not_found("report card").with_details(json!({ "reportCardId": report_card_id }))
    };
    let Some(rc) = load_report_card(conn, report_card_id)? else {
        return Err(not_found());
    };
    let owned: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM classrooms WHERE id = ? AND school_id = ?",
            (&rc.classroom_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    if owned.is_none() {
        return Err(not_found());
    }
    Ok(rc)
}

/// Roster of a classroom in enrollment order.
pub fn roster_ids(conn: &Connection, classroom_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM classroom_students WHERE classroom_id = ? ORDER BY sort_order, rowid",
    )?;
    let ids = stmt
        .query_map([classroom_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn current_locale(conn: &Connection) -> Locale {
    match db::settings_get_json(conn, LOCALE_SETTING) {
        Ok(Some(v)) => v
            .get("locale")
            .and_then(|l| l.as_str())
            .and_then(Locale::parse)
            .unwrap_or_default(),
        Ok(None) => Locale::default(),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable locale setting; using default");
            Locale::default()
        }
    }
}

/// Locale from an explicit `locale` param, else the workspace setting.
pub fn locale_param(state: &AppState, req: &Request) -> Result<Locale, HandlerErr> {
    if let Some(raw) = opt_str_param(req, "locale") {
        return Locale::parse(raw).ok_or_else(|| {
            HandlerErr::bad_params("locale must be one of: en, kh").with_details(json!({ "locale": raw }))
        });
    }
    Ok(state.db.as_ref().map(current_locale).unwrap_or_default())
}
