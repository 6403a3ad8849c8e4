use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Grade tiers for a report-card average. Thresholds are absolute points,
/// not percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Good,
    FairlyGood,
    Average,
    Poor,
}

impl Grade {
    pub fn from_average(average: f64) -> Self {
        if average >= 40.0 {
            Grade::Good
        } else if average >= 33.0 {
            Grade::FairlyGood
        } else if average >= 25.0 {
            Grade::Average
        } else {
            Grade::Poor
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Grade::Good => "good",
            Grade::FairlyGood => "fairly_good",
            Grade::Average => "average",
            Grade::Poor => "poor",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "good" => Some(Grade::Good),
            "fairly_good" => Some(Grade::FairlyGood),
            "average" => Some(Grade::Average),
            "poor" => Some(Grade::Poor),
            _ => None,
        }
    }

    /// i18n key of the tier label.
    pub fn message_key(self) -> &'static str {
        match self {
            Grade::Good => "gradeGood",
            Grade::FairlyGood => "gradeFairlyGood",
            Grade::Average => "gradeAverage",
            Grade::Poor => "gradePoor",
        }
    }
}

/// Lenient numeric parse for a raw score cell. Blank, non-numeric and
/// non-finite input all count as 0.
pub fn parse_score(raw: Option<&str>) -> f64 {
    let Some(s) = raw.map(str::trim) else {
        return 0.0;
    };
    if s.is_empty() {
        return 0.0;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Raw inputs for one student row: absence cell plus subject-key -> raw cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScores {
    #[serde(default)]
    pub absent: Option<String>,
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl RawScores {
    pub fn get(&self, subject: &str) -> Option<&str> {
        self.values.get(subject).map(String::as_str)
    }

    /// Overlays `other` onto `self`. Keys missing from `other` keep their
    /// previous value.
    pub fn merge_from(&mut self, other: &RawScores) {
        if other.absent.is_some() {
            self.absent = other.absent.clone();
        }
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedEntry {
    pub student_id: String,
    pub total: f64,
    pub average: f64,
    pub grade: Grade,
    pub rank: i64,
}

pub fn student_total(subjects: &[String], raw: Option<&RawScores>) -> f64 {
    subjects
        .iter()
        .map(|s| parse_score(raw.and_then(|r| r.get(s))))
        .sum()
}

pub fn student_average(total: f64, subject_count: usize) -> f64 {
    if subject_count == 0 {
        return 0.0;
    }
    round_2_decimals(total / subject_count as f64)
}

/// Competition ranking ("1224"): equal totals share the rank of the first
/// of the group, and the position counter still advances for every row.
/// Returned ranks are in input order.
pub fn competition_ranks(totals: &[f64]) -> Vec<i64> {
    let mut order: Vec<usize> = (0..totals.len()).collect();
    // Stable, so equal totals keep roster order.
    order.sort_by(|&a, &b| {
        totals[b]
            .partial_cmp(&totals[a])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0i64; totals.len()];
    let mut position: i64 = 1;
    for (i, &idx) in order.iter().enumerate() {
        if i > 0 && totals[idx] == totals[order[i - 1]] {
            ranks[idx] = ranks[order[i - 1]];
        } else {
            ranks[idx] = position;
        }
        position += 1;
    }
    ranks
}

/// Recomputes total/average/grade/rank for the whole roster. Rank is
/// relative, so this always takes every student of the report card.
pub fn compute_report(
    student_ids: &[String],
    subjects: &[String],
    raw: &HashMap<String, RawScores>,
) -> Vec<ComputedEntry> {
    let totals: Vec<f64> = student_ids
        .iter()
        .map(|id| student_total(subjects, raw.get(id)))
        .collect();
    let ranks = competition_ranks(&totals);

    student_ids
        .iter()
        .zip(totals.iter().zip(ranks))
        .map(|(id, (&total, rank))| {
            let average = student_average(total, subjects.len());
            ComputedEntry {
                student_id: id.clone(),
                total,
                average,
                grade: Grade::from_average(average),
                rank,
            }
        })
        .collect()
}
