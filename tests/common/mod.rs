#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        Self::spawn_with(&[])
    }

    pub fn spawn_with(args: &[&str]) -> Self {
        let exe = env!("CARGO_BIN_EXE_edgraded");
        let mut child = Command::new(exe)
            .args(args)
            .env_remove("EDGRADE_WORKSPACE")
            .env_remove("EDGRADE_PUBLIC_URL")
            .env_remove("EDGRADE_TOKEN_TTL_DAYS")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn edgraded");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns a sidecar on a fresh workspace.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut s = Self::spawn();
        s.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        (s, workspace)
    }

    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response");
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Sends a request that must succeed and returns its result.
    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Sends a request that must fail and returns its error code.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    /// Creates a school and opens a session for it.
    pub fn school_session(&mut self, name: &str, email: &str) -> String {
        let created = self.ok("admin.schools.create", json!({ "name": name, "email": email }));
        let school_id = created["schoolId"].as_str().expect("schoolId").to_string();
        self.ok("session.open", json!({ "schoolId": school_id }));
        school_id
    }

    pub fn create_classroom(&mut self, name: &str) -> String {
        let created = self.ok("classrooms.create", json!({ "name": name }));
        created["classroomId"].as_str().expect("classroomId").to_string()
    }

    pub fn create_student(&mut self, name: &str, gender: &str, phone: &str) -> String {
        let created = self.ok(
            "students.create",
            json!({ "name": name, "gender": gender, "guardianPhone": phone }),
        );
        created["studentId"].as_str().expect("studentId").to_string()
    }

    pub fn enroll(&mut self, classroom_id: &str, student_ids: &[String]) {
        self.ok(
            "classrooms.students.add",
            json!({ "classroomId": classroom_id, "studentIds": student_ids }),
        );
    }

    pub fn create_report_card(
        &mut self,
        classroom_id: &str,
        title: &str,
        subjects: &[&str],
    ) -> String {
        let created = self.ok(
            "reportCards.create",
            json!({ "classroomId": classroom_id, "title": title, "subjects": subjects }),
        );
        created["reportCardId"].as_str().expect("reportCardId").to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Entry of `entries` for one student.
pub fn entry_for<'a>(entries: &'a serde_json::Value, student_id: &str) -> &'a serde_json::Value {
    entries
        .as_array()
        .expect("entries array")
        .iter()
        .find(|e| e["studentId"] == student_id)
        .expect("entry for student")
}
