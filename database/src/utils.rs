use uuid::Uuid;

/// Fresh opaque account identifier (UUID v4, hyphenated text).
///
/// Called by the service layer before `insert`; the store never invents ids.
pub fn generate_account_id() -> String {
    Uuid::new_v4().to_string()
}
