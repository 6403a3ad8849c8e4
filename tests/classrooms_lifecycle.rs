mod common;

use common::Sidecar;
use serde_json::json;

#[test]
fn classrooms_create_rename_archive_and_list() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-classrooms-basic");
    s.school_session("Maple School", "office@maple.example");

    let created = s.ok("classrooms.create", json!({ "name": " Grade 10A ", "color": "#2563eb" }));
    let a = created["classroomId"].as_str().expect("classroomId").to_string();
    assert_eq!(created["name"], "Grade 10A");
    assert_eq!(created["color"], "#2563eb");
    let b = s.create_classroom("Grade 9B");
    let picked = s.ok("classrooms.get", json!({ "classroomId": b }));
    assert!(picked["classroom"]["color"].as_str().is_some_and(|c| !c.is_empty()));

    let resp = s.request("classrooms.create", json!({ "name": "grade 10a" }));
    assert_eq!(resp["error"]["code"], "duplicate_name");
    assert_eq!(resp["error"]["message"], "Classroom name already exists.");
    assert_eq!(
        s.err_code("classrooms.rename", json!({ "classroomId": b, "name": "GRADE 10A" })),
        "duplicate_name"
    );
    s.ok("classrooms.rename", json!({ "classroomId": a, "name": "Grade 10A" }));
    s.ok("classrooms.rename", json!({ "classroomId": b, "name": "Grade 9C" }));

    let listed = s.ok("classrooms.list", json!({}));
    let names: Vec<&str> = listed["classrooms"]
        .as_array()
        .expect("classrooms")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Grade 10A", "Grade 9C"]);

    s.ok("classrooms.archive", json!({ "classroomId": b }));
    let listed = s.ok("classrooms.list", json!({}));
    assert_eq!(listed["classrooms"].as_array().map(Vec::len), Some(1));
    let archived = s.ok("classrooms.listArchived", json!({}));
    assert_eq!(archived["classrooms"][0]["id"], b.as_str());
    assert_eq!(archived["classrooms"][0]["archived"], true);

    s.ok("classrooms.unarchive", json!({ "classroomId": b }));
    let listed = s.ok("classrooms.list", json!({}));
    assert_eq!(listed["classrooms"].as_array().map(Vec::len), Some(2));
}

#[test]
fn classrooms_are_scoped_to_the_session_school() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-classrooms-scope");
    assert_eq!(s.err_code("classrooms.list", json!({})), "no_session");

    s.school_session("Oak School", "office@oak.example");
    let mine = s.create_classroom("Grade 5");

    s.school_session("Pine School", "office@pine.example");
    assert_eq!(
        s.err_code("classrooms.get", json!({ "classroomId": mine })),
        "not_found"
    );
    // Same name is fine in another school.
    s.create_classroom("Grade 5");
}

#[test]
fn deleting_a_classroom_removes_its_report_cards_and_roster() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-classrooms-delete");
    s.school_session("Birch School", "office@birch.example");
    let classroom_id = s.create_classroom("Grade 4");
    let kid = s.create_student("Kosal", "male", "012121212");
    s.enroll(&classroom_id, &[kid.clone()]);
    let rc = s.create_report_card(&classroom_id, "Term 1", &["mathematics"]);
    s.ok("reportCards.scores.save", json!({ "reportCardId": rc, "scores": {} }));
    s.ok("draft.open", json!({ "reportCardId": rc }));

    let listed = s.ok("classrooms.list", json!({}));
    assert_eq!(listed["classrooms"][0]["studentCount"], 1);
    assert_eq!(listed["classrooms"][0]["reportCardCount"], 1);

    s.ok("classrooms.delete", json!({ "classroomId": classroom_id }));
    assert_eq!(
        s.err_code("reportCards.get", json!({ "reportCardId": rc })),
        "not_found"
    );
    assert_eq!(s.err_code("draft.preview", json!({})), "no_draft");

    // The student survives without the classroom.
    let student = s.ok("students.get", json!({ "studentId": kid }));
    assert_eq!(student["student"]["classroomIds"], json!([]));
}
