pub mod feedback;
pub mod intent;
pub mod session;
pub mod student;

pub use feedback::{FeedbackRecord, FeedbackScore};
pub use intent::{Intent, IntentClassification};
pub use session::VerifiedSession;
pub use student::StudentRecord;
