mod common;

use common::{entry_for, Sidecar};
use serde_json::json;

#[test]
fn custom_subjects_extend_the_picker_and_reject_duplicates() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-subjects-catalog");
    s.school_session("Northfield", "office@northfield.example");

    let listed = s.ok("subjects.list", json!({}));
    assert_eq!(listed["predefined"].as_array().map(Vec::len), Some(6));
    assert_eq!(listed["custom"], json!([]));
    assert_eq!(listed["labels"]["mathematics"], "Mathematics");

    let added = s.ok("subjects.add", json!({ "subject": "  music " }));
    assert_eq!(added["subject"], "music");
    assert_eq!(added["catalog"]["custom"], json!(["music"]));
    assert_eq!(added["draftSubjects"], serde_json::Value::Null);
    s.ok("subjects.add", json!({ "subject": "drawing" }));

    for dup in ["music", "mathematics"] {
        let code = s.err_code("subjects.add", json!({ "subject": dup }));
        assert_eq!(code, "duplicate_subject", "adding {dup}");
    }
    assert_eq!(s.err_code("subjects.add", json!({ "subject": "   " })), "bad_params");
    assert_eq!(s.err_code("subjects.add", json!({ "subject": "total" })), "bad_params");

    let listed = s.ok("subjects.list", json!({}));
    assert_eq!(listed["custom"], json!(["music", "drawing"]));
    let all = listed["all"].as_array().expect("all");
    assert_eq!(all.len(), 8);
    assert_eq!(all.last(), Some(&json!("drawing")));

    // Predefined keys cannot be removed.
    let resp = s.request("subjects.remove", json!({ "subject": "physics" }));
    assert_eq!(resp["error"]["code"], "not_found");
    assert_eq!(resp["error"]["details"]["predefined"], true);

    // Catalogs are per school.
    s.school_session("Southfield", "office@southfield.example");
    let other = s.ok("subjects.list", json!({}));
    assert_eq!(other["custom"], json!([]));
}

#[test]
fn removing_a_subject_deselects_it_in_the_open_draft_only() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-subjects-draft");
    s.school_session("Eastgate", "office@eastgate.example");
    let classroom_id = s.create_classroom("Grade 11");
    let kid = s.create_student("Rithy", "male", "010101010");
    s.enroll(&classroom_id, &[kid.clone()]);
    let rc = s.create_report_card(&classroom_id, "Term 2", &["mathematics"]);

    s.ok("draft.open", json!({ "reportCardId": rc }));
    let added = s.ok("subjects.add", json!({ "subject": "music" }));
    assert_eq!(added["draftSubjects"], json!(["mathematics", "music"]));

    s.ok(
        "draft.setScore",
        json!({ "studentId": kid, "field": "music", "value": "45" }),
    );
    s.ok(
        "draft.setScore",
        json!({ "studentId": kid, "field": "mathematics", "value": 30 }),
    );
    let saved = s.ok("draft.save", json!({}));
    assert_eq!(entry_for(&saved["entries"], &kid)["total"], json!(75.0));

    let removed = s.ok("subjects.remove", json!({ "subject": "music" }));
    assert_eq!(removed["draftSubjects"], json!(["mathematics"]));
    assert!(!removed["catalog"]["all"]
        .as_array()
        .expect("all")
        .contains(&json!("music")));

    let preview = s.ok("draft.preview", json!({}));
    assert_eq!(preview["subjects"], json!(["mathematics"]));
    assert_eq!(entry_for(&preview["entries"], &kid)["total"], json!(30.0));
    assert_eq!(preview["dirty"], true);

    // The saved entry is untouched until the draft is saved again.
    let stored = s.ok("reportCards.scores.get", json!({ "reportCardId": rc }));
    assert_eq!(entry_for(&stored["entries"], &kid)["total"], json!(75.0));
    assert_eq!(stored["subjects"], json!(["mathematics", "music"]));
}

#[test]
fn a_removed_custom_subject_can_still_be_deselected() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-subjects-stale");
    s.school_session("Westgate", "office@westgate.example");
    let classroom_id = s.create_classroom("Grade 4");
    let kid = s.create_student("Mealea", "female", "017171717");
    s.enroll(&classroom_id, &[kid.clone()]);
    s.ok("subjects.add", json!({ "subject": "music" }));
    let rc = s.create_report_card(&classroom_id, "Term 1", &["mathematics", "music"]);
    s.ok("subjects.remove", json!({ "subject": "music" }));

    // The card still lists it, so the editor may touch and drop it.
    let opened = s.ok("draft.open", json!({ "reportCardId": rc }));
    assert_eq!(opened["subjects"], json!(["mathematics", "music"]));
    s.ok(
        "draft.setScore",
        json!({ "studentId": kid, "field": "music", "value": "10" }),
    );
    let toggled = s.ok("draft.toggleSubject", json!({ "subject": "music" }));
    assert_eq!(toggled["toggled"]["selected"], false);
    assert_eq!(toggled["subjects"], json!(["mathematics"]));

    // Once dropped it cannot come back.
    assert_eq!(
        s.err_code("draft.toggleSubject", json!({ "subject": "music" })),
        "not_found"
    );
    let saved = s.ok("draft.save", json!({}));
    assert_eq!(saved["subjects"], json!(["mathematics"]));

    // The saved card no longer carries it either.
    assert_eq!(
        s.err_code(
            "reportCards.subjects.set",
            json!({ "reportCardId": rc, "subjects": ["mathematics", "music"] })
        ),
        "bad_params"
    );
}
