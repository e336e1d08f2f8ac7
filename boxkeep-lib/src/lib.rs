use chrono::{DateTime, Local};

pub mod backup;
pub mod image;
pub mod inspector;
pub mod launcher;
pub mod preflight;
pub mod restore;
pub mod settings;
pub mod translate;
pub mod volumes;

pub use backup::SnapshotWriter;
pub use boxkeep_common as common;
pub use restore::{JournalEntry, RestoreJournal, RestoreManager, RestoreOutcome, RestorePlan, RestoreStage};
pub use settings::Settings;

/// Timestamp format shared by snapshot directory names and snapshot image tags.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
