use serde::Serialize;
use thiserror::Error;

/// Fixed subject keys every school gets. Labels come from i18n.
pub const PREDEFINED_SUBJECTS: &[&str] = &[
    "khmerLiterature",
    "mathematics",
    "biology",
    "chemistry",
    "physics",
    "history",
];

/// Row fields of a score entry; a subject may not shadow them.
pub const RESERVED_KEYS: &[&str] = &["absent", "total", "average", "grade", "rank"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("subject must not be empty")]
    Empty,
    #[error("'{0}' is a reserved field name")]
    Reserved(String),
    #[error("subject '{0}' already exists")]
    Duplicate(String),
    #[error("subject '{0}' is not a custom subject")]
    NotCustom(String),
}

pub fn is_predefined(key: &str) -> bool {
    PREDEFINED_SUBJECTS.contains(&key)
}

pub fn predefined() -> Vec<String> {
    PREDEFINED_SUBJECTS.iter().map(|s| s.to_string()).collect()
}

/// Predefined keys merged with one owner's custom keys, in picker order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCatalog {
    pub predefined: Vec<String>,
    pub custom: Vec<String>,
}

impl SubjectCatalog {
    pub fn new(custom: Vec<String>) -> Self {
        Self {
            predefined: predefined(),
            custom,
        }
    }

    pub fn all(&self) -> Vec<String> {
        self.predefined
            .iter()
            .chain(self.custom.iter())
            .cloned()
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.predefined.iter().any(|s| s == key) || self.custom.iter().any(|s| s == key)
    }

    /// Validates a new custom key and returns it trimmed.
    pub fn check_new(&self, raw: &str) -> Result<String, CatalogError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(CatalogError::Empty);
        }
        if RESERVED_KEYS.contains(&key) {
            return Err(CatalogError::Reserved(key.to_string()));
        }
        if self.contains(key) {
            return Err(CatalogError::Duplicate(key.to_string()));
        }
        Ok(key.to_string())
    }

    pub fn check_removable(&self, raw: &str) -> Result<String, CatalogError> {
        let key = raw.trim();
        if self.custom.iter().any(|s| s == key) {
            Ok(key.to_string())
        } else {
            Err(CatalogError::NotCustom(key.to_string()))
        }
    }
}

/// Trims keys, drops blanks and reserved names, and keeps the first
/// occurrence of duplicates.
pub fn normalize_selection<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for k in keys {
        let k = k.as_ref().trim();
        if k.is_empty() || RESERVED_KEYS.contains(&k) || out.iter().any(|s| s == k) {
            continue;
        }
        out.push(k.to_string());
    }
    out
}
