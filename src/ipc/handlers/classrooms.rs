use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::report_cards::roster_changed;
use crate::ipc::handlers::students::{student_from_row, STUDENT_COLUMNS};
use crate::ipc::helpers::{
    ensure_owned_student, now_rfc3339, opt_str_param, owned_classroom, required_text, scoped,
    str_list_param, str_param, ClassroomRow,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Display tags handed out when the UI does not pick one.
pub const COLOR_OPTIONS: &[&str] = &[
    "bg-green-600",
    "bg-blue-500",
    "bg-amber-600",
    "bg-rose-500",
    "bg-sky-600",
    "bg-neutral-800",
    "bg-purple-600",
    "bg-yellow-500",
    "bg-teal-500",
    "bg-indigo-600",
];

fn random_color() -> &'static str {
    let b = Uuid::new_v4().as_bytes()[0] as usize;
    COLOR_OPTIONS[b % COLOR_OPTIONS.len()]
}

fn list_classrooms(
    conn: &Connection,
    school_id: &str,
    archived: bool,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    // Correlated subqueries keep the counts from multiplying each other.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.color,
           c.archived,
           c.created_at,
           (SELECT COUNT(*) FROM classroom_students cs WHERE cs.classroom_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM report_cards rc WHERE rc.classroom_id = c.id) AS report_card_count
         FROM classrooms c
         WHERE c.school_id = ? AND c.archived = ?
         ORDER BY c.name_norm",
    )?;
    let rows = stmt
        .query_map((school_id, archived as i64), |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let color: String = row.get(2)?;
            let archived: i64 = row.get(3)?;
            let created_at: String = row.get(4)?;
            let student_count: i64 = row.get(5)?;
            let report_card_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "name": name,
                "color": color,
                "archived": archived != 0,
                "createdAt": created_at,
                "studentCount": student_count,
                "reportCardCount": report_card_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn ensure_name_free(
    conn: &Connection,
    school_id: &str,
    name_norm: &str,
    except_id: Option<&str>,
) -> Result<(), HandlerErr> {
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM classrooms WHERE school_id = ? AND name_norm = ?",
            (school_id, name_norm),
            |r| r.get(0),
        )
        .optional()?;
    match taken {
        Some(id) if Some(id.as_str()) != except_id => Err(HandlerErr::new(
            "duplicate_name",
            "Classroom name already exists.",
        )
        .with_details(json!({ "classroomId": id }))),
        _ => Ok(()),
    }
}

fn classroom_json(c: &ClassroomRow) -> serde_json::Value {
    json!({
        "id": c.id,
        "name": c.name,
        "color": c.color,
        "archived": c.archived,
    })
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    Ok(json!({ "classrooms": list_classrooms(conn, &session.school_id, false)? }))
}

fn handle_list_archived(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    Ok(json!({ "classrooms": list_classrooms(conn, &session.school_id, true)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    Ok(json!({ "classroom": classroom_json(&c) }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let name = required_text(req, "name")?;
    let name_norm = name.to_lowercase();
    ensure_name_free(conn, &session.school_id, &name_norm, None)?;

    let color = match opt_str_param(req, "color").map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => random_color().to_string(),
    };

    let classroom_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classrooms(id, school_id, name, name_norm, color, archived, created_at)
         VALUES(?, ?, ?, ?, ?, 0, ?)",
        (
            &classroom_id,
            &session.school_id,
            &name,
            &name_norm,
            &color,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::insert("classrooms", e))?;

    Ok(json!({ "classroomId": classroom_id, "name": name, "color": color }))
}

fn handle_rename(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    let name = required_text(req, "name")?;
    let name_norm = name.to_lowercase();
    ensure_name_free(conn, &session.school_id, &name_norm, Some(&c.id))?;

    conn.execute(
        "UPDATE classrooms SET name = ?, name_norm = ? WHERE id = ?",
        (&name, &name_norm, &c.id),
    )
    .map_err(|e| HandlerErr::update("classrooms", e))?;
    Ok(json!({ "classroomId": c.id, "name": name }))
}

fn set_archived(state: &mut AppState, req: &Request, archived: bool) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    conn.execute(
        "UPDATE classrooms SET archived = ? WHERE id = ?",
        (archived as i64, &c.id),
    )
    .map_err(|e| HandlerErr::update("classrooms", e))?;
    Ok(json!({ "classroomId": c.id, "archived": archived }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = {
        let (conn, session) = scoped(state)?;
        let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

        // Explicit dependency order (no ON DELETE CASCADE).
        let steps: [(&str, &str); 6] = [
            (
                "sms_outbox",
                "DELETE FROM sms_outbox WHERE report_card_id IN (
                   SELECT id FROM report_cards WHERE classroom_id = ?1)",
            ),
            (
                "share_tokens",
                "DELETE FROM share_tokens WHERE report_card_id IN (
                   SELECT id FROM report_cards WHERE classroom_id = ?1)",
            ),
            (
                "report_card_scores",
                "DELETE FROM report_card_scores WHERE report_card_id IN (
                   SELECT id FROM report_cards WHERE classroom_id = ?1)",
            ),
            ("report_cards", "DELETE FROM report_cards WHERE classroom_id = ?1"),
            (
                "classroom_students",
                "DELETE FROM classroom_students WHERE classroom_id = ?1",
            ),
            ("classrooms", "DELETE FROM classrooms WHERE id = ?1"),
        ];
        for (table, sql) in steps {
            tx.execute(sql, [&c.id])
                .map_err(|e| HandlerErr::delete(table, e))?;
        }
        tx.commit()
            .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
        c.id
    };

    // The open draft may belong to one of the deleted report cards.
    let stale = match (state.draft.as_ref(), state.db.as_ref()) {
        (Some(draft), Some(conn)) => conn
            .query_row(
                "SELECT 1 FROM report_cards WHERE id = ?",
                [&draft.report_card_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_none(),
        _ => false,
    };
    if stale {
        state.draft = None;
    }

    Ok(json!({ "ok": true, "classroomId": classroom_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    let sql = format!(
        "SELECT {STUDENT_COLUMNS}
         FROM classroom_students cs
         JOIN students s ON s.id = cs.student_id
         WHERE cs.classroom_id = ?
         ORDER BY cs.sort_order, cs.rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map([&c.id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classroomId": c.id, "students": students }))
}

fn handle_students_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    let Some(student_ids) = str_list_param(req, "studentIds")? else {
        return Err(HandlerErr::bad_params("missing studentIds"));
    };
    for sid in &student_ids {
        ensure_owned_student(conn, &session.school_id, sid)?;
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut next_sort: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM classroom_students WHERE classroom_id = ?",
        [&c.id],
        |r| r.get(0),
    )?;

    let mut added: Vec<String> = Vec::new();
    let mut already_added: Vec<String> = Vec::new();
    for sid in student_ids {
        let present: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM classroom_students WHERE classroom_id = ? AND student_id = ?",
                (&c.id, &sid),
                |r| r.get(0),
            )
            .optional()?;
        if present.is_some() || added.contains(&sid) {
            if !already_added.contains(&sid) {
                already_added.push(sid);
            }
            continue;
        }
        tx.execute(
            "INSERT INTO classroom_students(classroom_id, student_id, sort_order) VALUES(?, ?, ?)",
            (&c.id, &sid, next_sort),
        )
        .map_err(|e| HandlerErr::insert("classroom_students", e))?;
        next_sort += 1;
        added.push(sid);
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    if !added.is_empty() {
        roster_changed(state, &[c.id])?;
    }
    Ok(json!({ "added": added, "alreadyAdded": already_added }))
}

fn handle_students_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = scoped(state)?;
    let c = owned_classroom(conn, &session.school_id, str_param(req, "classroomId")?)?;
    let student_id = str_param(req, "studentId")?;
    let n = conn
        .execute(
            "DELETE FROM classroom_students WHERE classroom_id = ? AND student_id = ?",
            (&c.id, student_id),
        )
        .map_err(|e| HandlerErr::delete("classroom_students", e))?;
    if n == 0 {
        return Err(HandlerErr::not_found("roster entry")
            .with_details(json!({ "classroomId": c.id, "studentId": student_id })));
    }
    roster_changed(state, &[c.id])?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "classrooms.list" => handle_list(state, req),
        "classrooms.listArchived" => handle_list_archived(state, req),
        "classrooms.get" => handle_get(state, req),
        "classrooms.create" => handle_create(state, req),
        "classrooms.rename" => handle_rename(state, req),
        "classrooms.archive" => set_archived(state, req, true),
        "classrooms.unarchive" => set_archived(state, req, false),
        "classrooms.delete" => handle_delete(state, req),
        "classrooms.students.list" => handle_students_list(state, req),
        "classrooms.students.add" => handle_students_add(state, req),
        "classrooms.students.remove" => handle_students_remove(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
