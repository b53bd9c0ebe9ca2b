use serde::{Deserialize, Serialize};

use super::student::StudentRecord;

/// A successful identity verification. `student_data` is a snapshot
/// taken at verification time and is never refreshed from the roster
/// within the session's lifetime. Sessions live until logout or
/// process restart; there is no persistence and no expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSession {
    pub session_id: String,
    pub student_number: String,
    pub name: String,
    pub student_data: StudentRecord,
}
