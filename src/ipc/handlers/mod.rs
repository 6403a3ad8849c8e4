pub mod admin;
pub mod classrooms;
pub mod core;
pub mod delivery;
pub mod drafts;
pub mod i18n;
pub mod report_cards;
pub mod session;
pub mod students;
pub mod subjects;
