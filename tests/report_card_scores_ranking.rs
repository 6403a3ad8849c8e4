mod common;

use common::{entry_for, Sidecar};
use serde_json::json;

struct Fixture {
    s: Sidecar,
    report_card_id: String,
    students: Vec<String>,
}

fn fixture(prefix: &str, n: usize, subjects: &[&str]) -> Fixture {
    let (mut s, _ws) = Sidecar::with_workspace(prefix);
    s.school_session("Sunrise High", "office@sunrise.example");
    let classroom_id = s.create_classroom("Grade 10A");
    let students: Vec<String> = (0..n)
        .map(|i| s.create_student(&format!("Student {i}"), "female", "012345678"))
        .collect();
    s.enroll(&classroom_id, &students);
    let report_card_id = s.create_report_card(&classroom_id, "Term 1", subjects);
    Fixture {
        s,
        report_card_id,
        students,
    }
}

#[test]
fn totals_averages_grades_and_ranks_are_derived_on_save() {
    let mut f = fixture("edgrade-scores-basic", 2, &["mathematics", "physics"]);
    let (a, b) = (f.students[0].clone(), f.students[1].clone());

    let saved = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": {
                a.clone(): { "mathematics": "45", "physics": "40" },
                b.clone(): { "mathematics": "30", "physics": "20", "absent": "1" },
            }
        }),
    );
    let ea = entry_for(&saved["entries"], &a);
    assert_eq!(ea["total"], json!(85.0));
    assert_eq!(ea["average"], json!(42.5));
    assert_eq!(ea["grade"], "good");
    assert_eq!(ea["gradeLabel"], "Good");
    assert_eq!(ea["rank"], 1);

    let eb = entry_for(&saved["entries"], &b);
    assert_eq!(eb["total"], json!(50.0));
    assert_eq!(eb["average"], json!(25.0));
    assert_eq!(eb["grade"], "average");
    assert_eq!(eb["absent"], "1");
    assert_eq!(eb["rank"], 2);

    // Stored rows read back identically.
    let got = f.s.ok(
        "reportCards.scores.get",
        json!({ "reportCardId": f.report_card_id }),
    );
    assert_eq!(entry_for(&got["entries"], &a)["rank"], 1);
    assert_eq!(entry_for(&got["entries"], &b)["total"], json!(50.0));
    assert_eq!(got["subjects"], json!(["mathematics", "physics"]));
}

#[test]
fn ties_share_a_rank_and_the_next_rank_skips() {
    let mut f = fixture("edgrade-scores-ties", 4, &["mathematics"]);
    let st = f.students.clone();
    let saved = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": {
                st[0].clone(): { "mathematics": "30" },
                st[1].clone(): { "mathematics": 30 },
                st[2].clone(): { "mathematics": "30.0" },
                st[3].clone(): { "mathematics": "10" },
            }
        }),
    );
    let ranks: Vec<i64> = st
        .iter()
        .map(|sid| entry_for(&saved["entries"], sid)["rank"].as_i64().expect("rank"))
        .collect();
    assert_eq!(ranks, vec![1, 1, 1, 4]);
}

#[test]
fn non_numeric_and_blank_inputs_count_as_zero() {
    let mut f = fixture("edgrade-scores-coerce", 2, &["mathematics", "biology"]);
    let (a, b) = (f.students[0].clone(), f.students[1].clone());
    let saved = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": {
                a.clone(): { "mathematics": "abc", "biology": "" },
                b.clone(): { "mathematics": "12.5", "biology": null },
            }
        }),
    );
    let ea = entry_for(&saved["entries"], &a);
    assert_eq!(ea["total"], json!(0.0));
    assert_eq!(ea["grade"], "poor");
    assert_eq!(ea["scores"]["mathematics"], "abc");
    let eb = entry_for(&saved["entries"], &b);
    assert_eq!(eb["total"], json!(12.5));
    assert_eq!(eb["average"], json!(6.25));
}

#[test]
fn saving_merges_over_previous_inputs_and_is_idempotent() {
    let mut f = fixture("edgrade-scores-merge", 2, &["mathematics", "physics"]);
    let (a, b) = (f.students[0].clone(), f.students[1].clone());
    f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": {
                a.clone(): { "mathematics": "20", "physics": "20" },
                b.clone(): { "mathematics": "10", "physics": "10" },
            }
        }),
    );

    // Only b's physics changes; a keeps its saved inputs.
    let second = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": { b.clone(): { "physics": "50", "total": "999" } }
        }),
    );
    assert_eq!(entry_for(&second["entries"], &a)["total"], json!(40.0));
    assert_eq!(entry_for(&second["entries"], &b)["total"], json!(60.0));
    assert_eq!(entry_for(&second["entries"], &b)["rank"], 1);

    let third = f.s.ok(
        "reportCards.scores.save",
        json!({ "reportCardId": f.report_card_id, "scores": {} }),
    );
    assert_eq!(third["entries"], second["entries"]);
}

#[test]
fn only_selected_subjects_count_toward_totals() {
    let mut f = fixture("edgrade-scores-subjects", 1, &["mathematics", "physics"]);
    let a = f.students[0].clone();
    f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": { a.clone(): { "mathematics": "40", "physics": "30" } }
        }),
    );
    let narrowed = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "subjects": ["mathematics"],
            "scores": {}
        }),
    );
    let ea = entry_for(&narrowed["entries"], &a);
    assert_eq!(ea["total"], json!(40.0));
    assert_eq!(ea["average"], json!(40.0));
    assert!(ea["scores"].get("physics").is_none());

    // Re-selecting physics brings back the kept input.
    let widened = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "subjects": ["mathematics", "physics"],
            "scores": {}
        }),
    );
    assert_eq!(entry_for(&widened["entries"], &a)["total"], json!(70.0));
}

#[test]
fn unknown_students_and_bad_payloads_are_rejected() {
    let mut f = fixture("edgrade-scores-reject", 1, &["mathematics"]);
    let code = f.s.err_code(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": { "not-on-roster": { "mathematics": "1" } }
        }),
    );
    assert_eq!(code, "bad_params");
    let code = f.s.err_code(
        "reportCards.scores.save",
        json!({ "reportCardId": f.report_card_id, "scores": [1, 2] }),
    );
    assert_eq!(code, "bad_params");
    let code = f.s.err_code(
        "reportCards.scores.get",
        json!({ "reportCardId": "missing" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn grade_labels_follow_the_workspace_locale() {
    let mut f = fixture("edgrade-scores-locale", 1, &["mathematics"]);
    let a = f.students[0].clone();
    f.s.ok("i18n.setLocale", json!({ "locale": "kh" }));
    let saved = f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": { a.clone(): { "mathematics": "35" } }
        }),
    );
    let ea = entry_for(&saved["entries"], &a);
    assert_eq!(ea["grade"], "fairly_good");
    assert_eq!(ea["gradeLabel"], "ល្អបង្គួរ");
}

fn ranks_by_student(s: &mut Sidecar, report_card_id: &str) -> Vec<(String, i64)> {
    let got = s.ok("reportCards.scores.get", json!({ "reportCardId": report_card_id }));
    got["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| {
            (
                e["studentId"].as_str().expect("studentId").to_string(),
                e["rank"].as_i64().expect("rank"),
            )
        })
        .collect()
}

#[test]
fn stored_ranks_follow_roster_changes() {
    let (mut s, _ws) = Sidecar::with_workspace("edgrade-scores-roster");
    s.school_session("Sunrise High", "office@sunrise.example");
    let classroom_id = s.create_classroom("Grade 10B");
    let st: Vec<String> = (0..3)
        .map(|i| s.create_student(&format!("Student {i}"), "male", "012345678"))
        .collect();
    s.enroll(&classroom_id, &st);
    let rc = s.create_report_card(&classroom_id, "Term 1", &["mathematics"]);
    s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": rc,
            "scores": {
                st[0].clone(): { "mathematics": "50" },
                st[1].clone(): { "mathematics": "40" },
                st[2].clone(): { "mathematics": "30" },
            }
        }),
    );

    // The top student leaves; the rest move up.
    s.ok(
        "classrooms.students.remove",
        json!({ "classroomId": classroom_id, "studentId": st[0] }),
    );
    assert_eq!(
        ranks_by_student(&mut s, &rc),
        vec![(st[1].clone(), 1), (st[2].clone(), 2)]
    );

    // Deleting a student outright re-ranks the survivor.
    s.ok("students.delete", json!({ "studentId": st[1] }));
    assert_eq!(ranks_by_student(&mut s, &rc), vec![(st[2].clone(), 1)]);

    // Newcomers get a stored row straight away and returning students
    // keep their inputs.
    let newcomer = s.create_student("Newcomer", "female", "012345679");
    s.enroll(&classroom_id, &[newcomer.clone(), st[0].clone()]);
    let got = s.ok("reportCards.scores.get", json!({ "reportCardId": rc }));
    let fresh = entry_for(&got["entries"], &newcomer);
    assert_eq!(fresh["total"], json!(0.0));
    assert_eq!(fresh["rank"], 3);
    assert_eq!(entry_for(&got["entries"], &st[0])["rank"], 1);
    assert_eq!(entry_for(&got["entries"], &st[2])["rank"], 2);
}

#[test]
fn changing_subjects_rederives_stored_totals() {
    let mut f = fixture("edgrade-scores-subjects-set", 2, &["mathematics", "physics"]);
    let (a, b) = (f.students[0].clone(), f.students[1].clone());
    f.s.ok(
        "reportCards.scores.save",
        json!({
            "reportCardId": f.report_card_id,
            "scores": {
                a.clone(): { "mathematics": "50", "physics": "30" },
                b.clone(): { "mathematics": "20", "physics": "45" },
            }
        }),
    );
    let set = f.s.ok(
        "reportCards.subjects.set",
        json!({ "reportCardId": f.report_card_id, "subjects": ["mathematics"] }),
    );
    assert_eq!(set["subjects"], json!(["mathematics"]));

    let got = f.s.ok(
        "reportCards.scores.get",
        json!({ "reportCardId": f.report_card_id }),
    );
    let ea = entry_for(&got["entries"], &a);
    assert_eq!(ea["total"], json!(50.0));
    assert_eq!(ea["average"], json!(50.0));
    assert_eq!(ea["grade"], "good");
    assert_eq!(ea["rank"], 1);
    let eb = entry_for(&got["entries"], &b);
    assert_eq!(eb["total"], json!(20.0));
    assert_eq!(eb["rank"], 2);
}

#[test]
fn unknown_subject_keys_are_rejected() {
    let mut f = fixture("edgrade-scores-unknown-subject", 1, &["mathematics"]);
    let code = f.s.err_code(
        "reportCards.subjects.set",
        json!({ "reportCardId": f.report_card_id, "subjects": ["mathematics", "astrology"] }),
    );
    assert_eq!(code, "bad_params");
    let code = f.s.err_code(
        "reportCards.scores.save",
        json!({ "reportCardId": f.report_card_id, "subjects": ["astrology"], "scores": {} }),
    );
    assert_eq!(code, "bad_params");

    let got = f.s.ok(
        "reportCards.scores.get",
        json!({ "reportCardId": f.report_card_id }),
    );
    assert_eq!(got["subjects"], json!(["mathematics"]));
}
