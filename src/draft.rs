use crate::calc::{self, ComputedEntry, RawScores};
use std::collections::HashMap;

/// The report card currently open in the score editor. Lives only in
/// memory and is rebuilt whenever a report card is opened.
#[derive(Debug, Clone)]
pub struct ReportCardDraft {
    pub report_card_id: String,
    pub student_ids: Vec<String>,
    pub selected: Vec<String>,
    pub scores: HashMap<String, RawScores>,
    pub dirty: bool,
}

impl ReportCardDraft {
    pub fn new(
        report_card_id: String,
        student_ids: Vec<String>,
        selected: Vec<String>,
        scores: HashMap<String, RawScores>,
    ) -> Self {
        Self {
            report_card_id,
            student_ids,
            selected,
            scores,
            dirty: false,
        }
    }

    /// Returns true when the subject ends up selected.
    pub fn toggle_subject(&mut self, key: &str) -> bool {
        self.dirty = true;
        if let Some(pos) = self.selected.iter().position(|s| s == key) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(key.to_string());
            true
        }
    }

    pub fn select(&mut self, key: &str) {
        if !self.selected.iter().any(|s| s == key) {
            self.selected.push(key.to_string());
            self.dirty = true;
        }
    }

    /// Drops `key` from the selection. Entered values stay in `scores`.
    pub fn deselect(&mut self, key: &str) -> bool {
        let before = self.selected.len();
        self.selected.retain(|s| s != key);
        let removed = self.selected.len() != before;
        self.dirty |= removed;
        removed
    }

    /// Follows a roster change made outside the editor. Students who left
    /// lose their pending values; newcomers start with empty rows.
    pub fn set_roster(&mut self, student_ids: Vec<String>) {
        self.scores.retain(|sid, _| student_ids.contains(sid));
        self.student_ids = student_ids;
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.student_ids.iter().any(|s| s == student_id)
    }

    pub fn set_cell(&mut self, student_id: &str, field: &str, value: &str) {
        let row = self.scores.entry(student_id.to_string()).or_default();
        if field == "absent" {
            row.absent = Some(value.to_string());
        } else {
            row.values.insert(field.to_string(), value.to_string());
        }
        self.dirty = true;
    }

    pub fn preview(&self) -> Vec<ComputedEntry> {
        calc::compute_report(&self.student_ids, &self.selected, &self.scores)
    }
}
