//! Broadcast event bus for external observers
//!
//! Events are published from the owning connection's task; a lagging
//! or absent subscriber can never fail a connection.

use crate::store::Identity;
use bytes::Bytes;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new account was registered
    IdentityCreated { identity: Identity },

    /// A connection authenticated successfully
    LoggedIn {
        identity: Identity,
        session_id: Uuid,
    },

    /// An authenticated connection went away
    Disconnected { identity: Identity },

    /// A screen frame arrived from an authenticated session
    FrameReceived { session_id: Uuid, bytes: Bytes },
}
