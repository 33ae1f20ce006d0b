//! Vigil Server - the supervising endpoint
//!
//! Consumes handshaken connections from the transport acceptor and
//! drives one session state machine per connection:
//! unauthenticated -> authenticated -> closed. Collaborators (credential
//! store, frame sink) plug in behind async traits; observers subscribe
//! to a broadcast event bus.

pub mod config;
pub mod events;
pub mod handler;
pub mod registry;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use events::ServerEvent;
pub use handler::Server;
pub use registry::SessionRegistry;
pub use session::{SessionError, SessionRecord};
pub use store::{
    CredentialStore, FrameSink, FsFrameSink, Identity, MemoryFrameSink, MemorySessionStore,
    MemoryUserStore, SessionStore, StoreError, User,
};
