use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Kh,
}

impl Locale {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Locale::En),
            "kh" | "km" => Some(Locale::Kh),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Kh => "kh",
        }
    }

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Locale::En => EN,
            Locale::Kh => KH,
        }
    }
}

/// Message for `key`, falling back to the key itself.
pub fn translate(locale: Locale, key: &str) -> String {
    locale
        .table()
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| key.to_string())
}

pub fn messages(locale: Locale) -> serde_json::Map<String, serde_json::Value> {
    locale
        .table()
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

const EN: &[(&str, &str)] = &[
    ("khmerLiterature", "Khmer Literature"),
    ("mathematics", "Mathematics"),
    ("biology", "Biology"),
    ("chemistry", "Chemistry"),
    ("physics", "Physics"),
    ("history", "History"),
    ("gradeGood", "Good"),
    ("gradeFairlyGood", "Fairly Good"),
    ("gradeAverage", "Average"),
    ("gradePoor", "Poor"),
    ("name", "Name"),
    ("absent", "Absent"),
    ("total", "Total"),
    ("average", "Average"),
    ("grade", "Grade"),
    ("ranking", "Ranking"),
    ("reportCard", "Report Card"),
    ("selectSubjects", "Select Subjects"),
    ("addNewSubject", "Add new subject"),
    ("removeCustomSubject", "Remove custom subject"),
    ("successfullySavedScores", "Scores saved successfully."),
    ("failedToSaveScores", "Failed to save scores."),
    ("failedToAddSubject", "Failed to add subject."),
    ("failedToRemoveSubject", "Failed to remove subject."),
    ("smsSentToParents", "SMS sent to parents."),
    ("failedToSendSMS", "Failed to send SMS."),
    ("classroomNotFound", "Classroom not found."),
    ("invalidLink", "This link is invalid or has already been used."),
    ("accountSuspended", "Account is suspended."),
    ("school", "School"),
    ("active", "Active"),
    ("deactivated", "Deactivated"),
    (
        "smsReportBody",
        "{student}: the report card \"{title}\" is ready. View it here: {link}",
    ),
];

const KH: &[(&str, &str)] = &[
    ("khmerLiterature", "អក្សរសាស្ត្រខ្មែរ"),
    ("mathematics", "គណិតវិទ្យា"),
    ("biology", "ជីវវិទ្យា"),
    ("chemistry", "គីមីវិទ្យា"),
    ("physics", "រូបវិទ្យា"),
    ("history", "ប្រវត្តិវិទ្យា"),
    ("gradeGood", "ល្អ"),
    ("gradeFairlyGood", "ល្អបង្គួរ"),
    ("gradeAverage", "មធ្យម"),
    ("gradePoor", "ខ្សោយ"),
    ("name", "ឈ្មោះ"),
    ("absent", "អវត្តមាន"),
    ("total", "ពិន្ទុសរុប"),
    ("average", "មធ្យមភាគ"),
    ("grade", "និទ្ទេស"),
    ("ranking", "ចំណាត់ថ្នាក់"),
    ("reportCard", "សៀវភៅតាមដាន"),
    ("selectSubjects", "ជ្រើសរើសមុខវិជ្ជា"),
    ("addNewSubject", "បន្ថែមមុខវិជ្ជាថ្មី"),
    ("removeCustomSubject", "លុបមុខវិជ្ជា"),
    ("successfullySavedScores", "បានរក្សាទុកពិន្ទុដោយជោគជ័យ។"),
    ("failedToSaveScores", "រក្សាទុកពិន្ទុមិនបានសម្រេច។"),
    ("failedToAddSubject", "បន្ថែមមុខវិជ្ជាមិនបានសម្រេច។"),
    ("failedToRemoveSubject", "លុបមុខវិជ្ជាមិនបានសម្រេច។"),
    ("smsSentToParents", "បានផ្ញើសារទៅមាតាបិតា។"),
    ("failedToSendSMS", "ផ្ញើសារមិនបានសម្រេច។"),
    ("classroomNotFound", "រកមិនឃើញថ្នាក់រៀន។"),
    ("invalidLink", "តំណនេះមិនត្រឹមត្រូវ ឬត្រូវបានប្រើរួចហើយ។"),
    ("accountSuspended", "គណនីត្រូវបានផ្អាក។"),
    ("school", "សាលា"),
    ("active", "សកម្ម"),
    ("deactivated", "បានបិទ"),
    (
        "smsReportBody",
        "{student}: លទ្ធផល \"{title}\" រួចរាល់ហើយ។ មើលនៅទីនេះ: {link}",
    ),
];
