//! Registry of live connection handles.
//!
//! `SessionRegistry` maps [`SessionId`]s to [`WsConnection`] handles so that
//! other tasks can reach a connection by id. An entry stays registered until
//! its driver stops; stale entries are pruned opportunistically or lazily at
//! lookup time.

use dashmap::DashMap;

use crate::{driver::WsConnection, message::SessionId};

/// Concurrent registry of connection handles keyed by [`SessionId`].
#[derive(Debug, Default)]
pub struct SessionRegistry(DashMap<SessionId, WsConnection>);

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Retrieve the handle for `id` if its driver is still running.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<WsConnection> {
        let handle = self
            .0
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed());
        if handle.is_none() {
            self.0.remove_if(id, |_, handle| handle.is_closed());
        }
        handle
    }

    /// Register the handle of a newly established connection.
    pub fn insert(&self, handle: &WsConnection) { self.0.insert(handle.session_id(), handle.clone()); }

    /// Remove a handle, typically on connection teardown.
    pub fn remove(&self, id: &SessionId) { self.0.remove(id); }

    /// Remove every entry whose driver has stopped.
    ///
    /// `DashMap::retain` acquires per-bucket write locks, so other operations
    /// may contend briefly while the registry is pruned.
    pub fn prune(&self) { self.0.retain(|_, handle| !handle.is_closed()); }

    /// Prune stale entries, then return the ids of the live connections.
    #[must_use]
    pub fn active_ids(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, handle| {
            if handle.is_closed() {
                false
            } else {
                ids.push(*id);
                true
            }
        });
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
