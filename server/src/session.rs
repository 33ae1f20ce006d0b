//! Per-connection session state and credential constraints

use thiserror::Error;
use uuid::Uuid;
use vigil_transport::ChannelError;

pub const USERNAME_MIN: usize = 4;
pub const USERNAME_MAX: usize = 32;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 64;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The peer sent a message kind that is illegal in the session's
    /// current state; the connection is closed
    #[error("Protocol violation: unexpected {0} packet")]
    Violation(&'static str),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Login metadata persisted when a session authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: u64,
    pub ip: String,
    pub client_id: String,
    pub login_time_ms: u64,
}

/// Check the schema constraints on a credential pair.
///
/// Violations are ordinary rejections, never protocol errors; the
/// returned string goes straight into a `Response{success:false}`.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), String> {
    let name_len = username.chars().count();
    if name_len < USERNAME_MIN || name_len > USERNAME_MAX {
        return Err(format!(
            "Username must be between {USERNAME_MIN}-{USERNAME_MAX} characters"
        ));
    }
    let pass_len = password.chars().count();
    if pass_len < PASSWORD_MIN || pass_len > PASSWORD_MAX {
        return Err(format!(
            "Password must be between {PASSWORD_MIN}-{PASSWORD_MAX} characters"
        ));
    }
    Ok(())
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
