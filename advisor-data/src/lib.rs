pub mod columns;
pub mod feedback;
pub mod roster;

pub use columns::{identity_columns, resolve, ColumnRole};
pub use feedback::{
    FeedbackBackend, FeedbackStore, JsonlFeedbackLog, MemoryFeedbackLog, PgFeedbackLog,
};
pub use roster::{summary_stats, verify_student, MemoryRoster, PgRoster, Roster};
