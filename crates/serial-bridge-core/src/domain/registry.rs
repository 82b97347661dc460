//! SessionRegistry: the ordered collection of admitted sessions.
//!
//! Order is acceptance order and it matters: outbound chunks are written to
//! sessions in registry order, and cleanup is a *stable* filter so the
//! survivors keep their relative order.

use tracing::info;

use super::session::{Session, SessionId};

/// Ordered list of sessions, oldest first.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Appends `session` at the end of the registry.
    pub fn register(&mut self, session: Session) -> SessionId {
        let id = session.id();
        debug_assert!(!self.contains(id), "session {id} registered twice");
        self.sessions.push(session);
        id
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|s| s.id() == id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    /// Iterates sessions in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    /// Removes every `Disconnected` session and releases its link.
    ///
    /// Returns the identifiers of the removed sessions in registry order.
    /// A removed session is gone for good, so no session is processed twice.
    pub fn cleanup(&mut self) -> Vec<String> {
        if self.sessions.iter().all(Session::is_connected) {
            return Vec::new();
        }

        let (kept, removed): (Vec<Session>, Vec<Session>) =
            std::mem::take(&mut self.sessions)
                .into_iter()
                .partition(Session::is_connected);
        self.sessions = kept;

        removed
            .into_iter()
            .map(|session| {
                info!(session = %session.id(), "client {} disconnected", session.identifier());
                // Dropping the session releases its link.
                session.identifier().to_string()
            })
            .collect()
    }

    /// Writes `chunk` to every `Connected` session, in registry order.
    ///
    /// Returns how many sessions received the chunk.
    pub fn broadcast(&mut self, chunk: &[u8]) -> usize {
        let mut delivered = 0;
        for session in self.sessions.iter_mut().filter(|s| s.is_connected()) {
            session.send(chunk);
            delivered += 1;
        }
        delivered
    }

    /// Force-closes every session exactly once and empties the registry.
    ///
    /// Returns how many sessions were closed; `0` for an empty registry.
    pub fn shutdown(&mut self) -> usize {
        let closed = self.sessions.len();
        for mut session in self.sessions.drain(..) {
            session.force_close();
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::{LinkTap, MockIncoming};
    use crate::ports::IncomingConnection;
    use uuid::Uuid;

    fn make_session(identifier: &str) -> (Session, LinkTap) {
        let (incoming, tap) = MockIncoming::new(identifier);
        let id = Uuid::new_v4();
        let link = Box::new(incoming).attach(id);
        (Session::new(id, identifier, link), tap)
    }

    fn identifiers(registry: &SessionRegistry) -> Vec<String> {
        registry.iter().map(|s| s.identifier().to_string()).collect()
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_preserves_acceptance_order() {
        let mut registry = SessionRegistry::new();
        for name in ["a", "b", "c"] {
            let (session, _tap) = make_session(name);
            registry.register(session);
        }
        assert_eq!(identifiers(&registry), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cleanup_removes_only_disconnected_sessions_stably() {
        // Arrange
        let mut registry = SessionRegistry::new();
        let mut ids = Vec::new();
        let mut taps = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let (session, tap) = make_session(name);
            ids.push(registry.register(session));
            taps.push(tap);
        }
        registry.get_mut(ids[1]).unwrap().mark_disconnected();
        registry.get_mut(ids[3]).unwrap().mark_disconnected();

        // Act
        let removed = registry.cleanup();

        // Assert
        assert_eq!(removed, vec!["b", "d"]);
        assert_eq!(identifiers(&registry), vec!["a", "c"]);
        assert!(!taps[0].is_released());
        assert!(taps[1].is_released());
        assert!(!taps[2].is_released());
        assert!(taps[3].is_released());
    }

    #[test]
    fn test_cleanup_is_noop_when_everyone_is_connected() {
        let mut registry = SessionRegistry::new();
        let (session, tap) = make_session("a");
        registry.register(session);

        assert!(registry.cleanup().is_empty());
        assert_eq!(registry.len(), 1);
        assert!(!tap.is_released());
    }

    #[test]
    fn test_cleanup_removes_each_session_exactly_once() {
        let mut registry = SessionRegistry::new();
        let (session, _tap) = make_session("a");
        let id = registry.register(session);
        registry.get_mut(id).unwrap().mark_disconnected();

        assert_eq!(registry.cleanup(), vec!["a"]);
        assert!(registry.cleanup().is_empty());
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_broadcast_skips_disconnected_sessions() {
        let mut registry = SessionRegistry::new();
        let (a, tap_a) = make_session("a");
        let (b, tap_b) = make_session("b");
        registry.register(a);
        let id_b = registry.register(b);
        registry.get_mut(id_b).unwrap().mark_disconnected();

        let delivered = registry.broadcast(b"XYZ");

        assert_eq!(delivered, 1);
        assert_eq!(tap_a.received(), b"XYZ");
        assert!(tap_b.received().is_empty());
    }

    #[test]
    fn test_shutdown_closes_every_session_once_and_empties_registry() {
        let mut registry = SessionRegistry::new();
        let (a, tap_a) = make_session("a");
        let (b, tap_b) = make_session("b");
        registry.register(a);
        registry.register(b);

        assert_eq!(registry.shutdown(), 2);

        assert!(registry.is_empty());
        assert_eq!(tap_a.close_count(), 1);
        assert_eq!(tap_b.close_count(), 1);
        assert!(tap_a.is_released());
        assert!(tap_b.is_released());
    }

    #[test]
    fn test_shutdown_on_empty_registry_is_noop() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.shutdown(), 0);
        assert_eq!(registry.shutdown(), 0);
    }
}
