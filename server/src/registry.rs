//! Shared registries for live sessions and active logins

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;
use uuid::Uuid;
use vigil_protocol::{FrequencyUpdate, Message, Packet};

/// Maps live session ids to their outbound packet queues, and
/// authenticated identities to the single session holding them.
///
/// Shared by every connection task; all operations are single
/// synchronization points, so a login claim can never race its own
/// existence check.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, UnboundedSender<Packet>>,
    logins: DashMap<u64, Uuid>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            logins: DashMap::new(),
        }
    }

    pub fn register(&self, session_id: Uuid, outbound: UnboundedSender<Packet>) {
        self.sessions.insert(session_id, outbound);
    }

    pub fn unregister(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Claim the single active session for an identity.
    ///
    /// The check and the insert happen under one map entry, so of two
    /// concurrent claims exactly one wins.
    pub fn claim_login(&self, user_id: u64, session_id: Uuid) -> bool {
        match self.logins.entry(user_id) {
            dashmap::Entry::Occupied(_) => false,
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(session_id);
                true
            }
        }
    }

    /// Release a login claim, but only if this session still holds it
    pub fn release_login(&self, user_id: u64, session_id: Uuid) {
        self.logins
            .remove_if(&user_id, |_, held_by| *held_by == session_id);
    }

    pub fn is_logged_in(&self, user_id: u64) -> bool {
        self.logins.contains_key(&user_id)
    }

    /// Push a capture-interval change to one session.
    ///
    /// Returns false if the session is gone; the queue is unbounded,
    /// so a send never blocks the supervising side.
    pub fn send_frequency(&self, session_id: Uuid, seconds: u32) -> bool {
        let Some(outbound) = self.sessions.get(&session_id) else {
            return false;
        };
        let sent = outbound
            .send(Packet::new(Message::FrequencyUpdate(FrequencyUpdate {
                seconds,
            })))
            .is_ok();
        trace!(%session_id, seconds, sent, "frequency update queued");
        sent
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_single_claim_wins() {
        let registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(registry.claim_login(7, first));
        assert!(!registry.claim_login(7, second));
        assert!(registry.is_logged_in(7));
    }

    #[test]
    fn test_release_only_by_holder() {
        let registry = SessionRegistry::new();
        let holder = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(registry.claim_login(7, holder));
        registry.release_login(7, other);
        assert!(registry.is_logged_in(7));

        registry.release_login(7, holder);
        assert!(!registry.is_logged_in(7));
        assert!(registry.claim_login(7, other));
    }

    #[test]
    fn test_send_frequency() {
        let registry = SessionRegistry::new();
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!registry.send_frequency(session, 10));
        assert_eq!(registry.count(), 0);

        registry.register(session, tx);
        assert_eq!(registry.count(), 1);
        assert!(registry.send_frequency(session, 10));

        let packet = rx.try_recv().unwrap();
        assert!(matches!(
            packet.message(),
            Message::FrequencyUpdate(FrequencyUpdate { seconds: 10 })
        ));

        registry.unregister(session);
        assert_eq!(registry.count(), 0);
        assert!(!registry.send_frequency(session, 10));
    }
}
