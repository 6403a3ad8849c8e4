use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::report_cards::roster_changed;
use crate::ipc::helpers::{ensure_owned_student, now_rfc3339, required_text, scoped, str_param};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Column list matching `student_from_row`, qualified with alias `s`.
pub const STUDENT_COLUMNS: &str = "s.id, s.student_code, s.name, s.gender, s.guardian_phone, \
     s.phone, s.dob, s.address, s.photo, s.created_at, s.updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StudentFieldError {
    #[error("gender must be Male or Female, got '{0}'")]
    Gender(String),
}

impl Gender {
    pub fn parse(raw: &str) -> Result<Self, StudentFieldError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            _ => Err(StudentFieldError::Gender(raw.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl From<StudentFieldError> for HandlerErr {
    fn from(e: StudentFieldError) -> Self {
        HandlerErr::bad_params(e.to_string())
    }
}

pub fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let student_code: String = row.get(1)?;
    let name: String = row.get(2)?;
    let gender: String = row.get(3)?;
    let guardian_phone: String = row.get(4)?;
    let phone: Option<String> = row.get(5)?;
    let dob: Option<String> = row.get(6)?;
    let address: Option<String> = row.get(7)?;
    let photo: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: Option<String> = row.get(10)?;
    Ok(json!({
        "id": id,
        "studentCode": student_code,
        "name": name,
        "gender": gender,
        "guardianPhone": guardian_phone,
        "phone": phone,
        "dob": dob,
        "address": address,
        "photo": photo,
        "createdAt": created_at,
        "updatedAt": updated_at,
    }))
}

fn ensure_code_free(
    conn: &Connection,
    school_id: &str,
    code: &str,
    except_id: Option<&str>,
) -> Result<(), HandlerErr> {
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE school_id = ? AND student_code = ?",
            (school_id, code),
            |r| r.get(0),
        )
        .optional()?;
    match taken {
        Some(id) if Some(id.as_str()) != except_id => Err(HandlerErr::new(
            "duplicate_student_code",
            "student code already in use",
        )
        .with_details(json!({ "studentCode": code }))),
        _ => Ok(()),
    }
}

/// Next free `S00001`-style code for the school.
fn next_student_code(conn: &Connection, school_id: &str) -> Result<String, HandlerErr> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE school_id = ?",
        [school_id],
        |r| r.get(0),
    )?;
    let mut n = count + 1;
    loop {
        let code = format!("S{:05}", n);
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM students WHERE school_id = ? AND student_code = ?",
                (school_id, &code),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_none() {
            return Ok(code);
        }
        n += 1;
    }
}

fn optional_text(v: Option<&serde_json::Value>, field: &str) -> Result<Option<String>, HandlerErr> {
    match v {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{field} must be a string or null"))),
    }
}

fn load_student(conn: &Connection, school_id: &str, student_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students s WHERE s.id = ? AND s.school_id = ?");
    conn.query_row(&sql, (student_id, school_id), student_from_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("student").with_details(json!({ "studentId": student_id })))
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students s
         WHERE s.school_id = ?
         ORDER BY s.created_at DESC, s.rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map([&session.school_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let student_id = str_param(req, "studentId")?;
    let mut student = load_student(conn, &session.school_id, student_id)?;

    let mut stmt = conn.prepare(
        "SELECT classroom_id FROM classroom_students WHERE student_id = ? ORDER BY rowid",
    )?;
    let classroom_ids = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    student["classroomIds"] = json!(classroom_ids);
    Ok(json!({ "student": student }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let name = required_text(req, "name")?;
    let gender = Gender::parse(str_param(req, "gender")?)?;
    let guardian_phone = required_text(req, "guardianPhone")?;
    let phone = optional_text(req.params.get("phone"), "phone")?;
    let dob = optional_text(req.params.get("dob"), "dob")?;
    let address = optional_text(req.params.get("address"), "address")?;
    let photo = optional_text(req.params.get("photo"), "photo")?;

    let student_code = match optional_text(req.params.get("studentCode"), "studentCode")? {
        Some(code) => {
            ensure_code_free(conn, &session.school_id, &code, None)?;
            code
        }
        None => next_student_code(conn, &session.school_id)?,
    };

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
            id, school_id, student_code, name, gender, guardian_phone,
            phone, dob, address, photo, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &session.school_id,
            &student_code,
            &name,
            gender.as_str(),
            &guardian_phone,
            &phone,
            &dob,
            &address,
            &photo,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::insert("students", e))?;

    let student = load_student(conn, &session.school_id, &student_id)?;
    Ok(json!({ "studentId": student_id, "student": student }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let student_id = str_param(req, "studentId")?;
    ensure_owned_student(conn, &session.school_id, student_id)?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing patch"));
    };

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    for (field, column) in [("name", "name = ?"), ("guardianPhone", "guardian_phone = ?")] {
        if let Some(v) = patch.get(field) {
            match optional_text(Some(v), field)? {
                Some(s) => {
                    sets.push(column);
                    values.push(Value::Text(s));
                }
                None => return Err(HandlerErr::bad_params(format!("{field} must not be empty"))),
            }
        }
    }
    if let Some(v) = patch.get("gender") {
        let raw = v
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("gender must be a string"))?;
        sets.push("gender = ?");
        values.push(Value::Text(Gender::parse(raw)?.as_str().to_string()));
    }
    if let Some(v) = patch.get("studentCode") {
        let Some(code) = optional_text(Some(v), "studentCode")? else {
            return Err(HandlerErr::bad_params("studentCode must not be empty"));
        };
        ensure_code_free(conn, &session.school_id, &code, Some(student_id))?;
        sets.push("student_code = ?");
        values.push(Value::Text(code));
    }
    for (field, column) in [
        ("phone", "phone = ?"),
        ("dob", "dob = ?"),
        ("address", "address = ?"),
        ("photo", "photo = ?"),
    ] {
        if let Some(v) = patch.get(field) {
            sets.push(column);
            values.push(match optional_text(Some(v), field)? {
                Some(s) => Value::Text(s),
                None => Value::Null,
            });
        }
    }

    if sets.is_empty() {
        return Err(HandlerErr::bad_params("patch has no known fields"));
    }
    sets.push("updated_at = ?");
    values.push(Value::Text(now_rfc3339()));
    values.push(Value::Text(student_id.to_string()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    conn.execute(&sql, params_from_iter(values))
        .map_err(|e| HandlerErr::update("students", e))?;

    let student = load_student(conn, &session.school_id, student_id)?;
    Ok(json!({ "student": student }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let classroom_ids = {
        let (conn, session) = scoped(state)?;
        let student_id = str_param(req, "studentId")?;
        ensure_owned_student(conn, &session.school_id, student_id)?;

        let mut stmt =
            conn.prepare("SELECT classroom_id FROM classroom_students WHERE student_id = ?")?;
        let classroom_ids = stmt
            .query_map([student_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
        let steps: [(&str, &str); 5] = [
            ("sms_outbox", "DELETE FROM sms_outbox WHERE student_id = ?1"),
            ("share_tokens", "DELETE FROM share_tokens WHERE student_id = ?1"),
            (
                "report_card_scores",
                "DELETE FROM report_card_scores WHERE student_id = ?1",
            ),
            (
                "classroom_students",
                "DELETE FROM classroom_students WHERE student_id = ?1",
            ),
            ("students", "DELETE FROM students WHERE id = ?1"),
        ];
        for (table, sql) in steps {
            tx.execute(sql, [student_id])
                .map_err(|e| HandlerErr::delete(table, e))?;
        }
        tx.commit()
            .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
        classroom_ids
    };

    roster_changed(state, &classroom_ids)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "students.list" => handle_list(state, req),
        "students.get" => handle_get(state, req),
        "students.create" => handle_create(state, req),
        "students.update" => handle_update(state, req),
        "students.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_parse_is_case_insensitive() {
        assert_eq!(Gender::parse("male"), Ok(Gender::Male));
        assert_eq!(Gender::parse(" FEMALE "), Ok(Gender::Female));
        assert_eq!(Gender::parse("F"), Ok(Gender::Female));
        assert_eq!(
            Gender::parse("other"),
            Err(StudentFieldError::Gender("other".into()))
        );
        assert_eq!(Gender::Male.as_str(), "Male");
    }
}
