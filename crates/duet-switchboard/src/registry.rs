//! Identity → connection map.
//!
//! The registry is the single source of truth for "is this user currently
//! reachable." Binding and unbinding happen inside the switchboard's
//! authentication and teardown paths, which also record the matching
//! online/offline presence side effects with the external directory.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use duet_core::{ServerMessage, UserId};

use crate::client::ClientHandle;

/// Live connections keyed by bound user identity.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<UserId, Arc<ClientHandle>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` as the connection for `user`.
    ///
    /// Returns the displaced handle if the identity was already bound; the
    /// caller is responsible for tearing the old connection down.
    pub fn bind(&self, user: UserId, handle: Arc<ClientHandle>) -> Option<Arc<ClientHandle>> {
        self.clients.insert(user, handle)
    }

    /// Look up the connection bound to `user`.
    #[must_use]
    pub fn lookup(&self, user: &UserId) -> Option<Arc<ClientHandle>> {
        self.clients.get(user).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the mapping for `user` only if it still points at `handle`.
    ///
    /// Returns `true` if the mapping was removed. The epoch check keeps a
    /// stale connection's teardown from unbinding its replacement.
    pub fn unbind_if_current(&self, user: &UserId, handle: &Arc<ClientHandle>) -> bool {
        self.clients
            .remove_if(user, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Whether `user` is bound to a connection that has not begun closing.
    #[must_use]
    pub fn is_reachable(&self, user: &UserId) -> bool {
        self.clients
            .get(user)
            .is_some_and(|entry| !entry.value().is_closing())
    }

    /// Deliver `message` to `user`, best effort.
    ///
    /// Returns `false` (and logs) if the identity is absent, closing, or its
    /// queue refused the message. Never fails the caller.
    pub fn send_to(&self, user: &UserId, message: ServerMessage) -> bool {
        match self.lookup(user) {
            Some(handle) if !handle.is_closing() => {
                let delivered = handle.send(message);
                if !delivered {
                    debug!(user = %user, "dropping message: client queue full or closed");
                }
                delivered
            }
            _ => {
                debug!(user = %user, "dropping message: user not reachable");
                false
            }
        }
    }

    /// Number of bound connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::client_channel;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_client() -> (Arc<ClientHandle>, mpsc::Receiver<ServerMessage>) {
        client_channel(8, CancellationToken::new())
    }

    #[test]
    fn bind_and_lookup() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = make_client();
        let user = UserId::from("u_1");

        assert!(registry.bind(user.clone(), Arc::clone(&handle)).is_none());
        let found = registry.lookup(&user).unwrap();
        assert!(Arc::ptr_eq(&found, &handle));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn bind_replaces_and_returns_old() {
        let registry = ClientRegistry::new();
        let (first, _rx1) = make_client();
        let (second, _rx2) = make_client();
        let user = UserId::from("u_1");

        assert!(registry.bind(user.clone(), Arc::clone(&first)).is_none());
        let displaced = registry.bind(user.clone(), Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&displaced, &first));

        let current = registry.lookup(&user).unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unbind_if_current_respects_epoch() {
        let registry = ClientRegistry::new();
        let (old, _rx1) = make_client();
        let (new, _rx2) = make_client();
        let user = UserId::from("u_1");

        let _ = registry.bind(user.clone(), Arc::clone(&old));
        let _ = registry.bind(user.clone(), Arc::clone(&new));

        // The stale connection's teardown must not remove its replacement.
        assert!(!registry.unbind_if_current(&user, &old));
        assert!(registry.lookup(&user).is_some());

        assert!(registry.unbind_if_current(&user, &new));
        assert!(registry.lookup(&user).is_none());
    }

    #[test]
    fn unbind_is_idempotent() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = make_client();
        let user = UserId::from("u_1");

        let _ = registry.bind(user.clone(), Arc::clone(&handle));
        assert!(registry.unbind_if_current(&user, &handle));
        assert!(!registry.unbind_if_current(&user, &handle));
    }

    #[tokio::test]
    async fn send_to_bound_user_delivers() {
        let registry = ClientRegistry::new();
        let (handle, mut rx) = make_client();
        let user = UserId::from("u_1");
        let _ = registry.bind(user.clone(), handle);

        assert!(registry.send_to(&user, ServerMessage::PartnerLeft));
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::PartnerLeft));
    }

    #[test]
    fn send_to_absent_user_is_reported_noop() {
        let registry = ClientRegistry::new();
        assert!(!registry.send_to(&UserId::from("u_nobody"), ServerMessage::PartnerLeft));
    }

    #[test]
    fn send_to_closing_connection_is_dropped() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = make_client();
        let user = UserId::from("u_1");
        let _ = registry.bind(user.clone(), Arc::clone(&handle));

        handle.close();
        assert!(!registry.send_to(&user, ServerMessage::PartnerLeft));
        assert!(!registry.is_reachable(&user));
    }

    #[test]
    fn reachability_tracks_binding() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = make_client();
        let user = UserId::from("u_1");

        assert!(!registry.is_reachable(&user));
        let _ = registry.bind(user.clone(), Arc::clone(&handle));
        assert!(registry.is_reachable(&user));
        let _ = registry.unbind_if_current(&user, &handle);
        assert!(!registry.is_reachable(&user));
    }
}
