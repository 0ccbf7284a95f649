//! The table of live connections.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::catalog::types::StudentCode;
use crate::constants::NAME_SEP;
use crate::network::types::ValidationError;

const SUFFIX_LEN: usize = 6;

/// Identifies one connection and prefixes the names of all rules that realize it. Handlers never
/// contain [`NAME_SEP`].
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Handler(String);

impl Handler {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Handler {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !s.contains(NAME_SEP);
        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(ValidationError::InvalidHandler(s.to_owned()))
        }
    }
}

impl TryFrom<String> for Handler {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Handler> for String {
    fn from(handler: Handler) -> Self {
        handler.0
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An active connection and the rules it owns.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Connection {
    pub handler: Handler,
    pub student: StudentCode,
    pub server: String,
    pub service: String,
    /// Exactly the rules the controller acknowledged for this connection, in install order.
    pub flows: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Connection {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Live connections keyed by handler.
///
/// A handler goes through `allocate` (pending, invisible to [`list`](Self::list)), then either
/// `create` (live) or `abandon`. A live connection leaves through `remove`, which is the only way
/// to get its rule names back. No handler is ever issued twice.
#[derive(Debug)]
pub struct ConnectionRegistry {
    // Keyed by allocation sequence number so listing follows creation order.
    live: BTreeMap<u64, Connection>,
    index: FxHashMap<Handler, u64>,
    pending: FxHashMap<Handler, u64>,
    next: u64,
    rng: StdRng,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Creates a registry whose handler suffixes are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            live: BTreeMap::new(),
            index: FxHashMap::default(),
            pending: FxHashMap::default(),
            next: 0,
            rng,
        }
    }

    /// Reserves a fresh handler.
    pub fn allocate(&mut self) -> Handler {
        loop {
            self.next += 1;
            let suffix = (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take(SUFFIX_LEN)
                .map(|b| char::from(b).to_ascii_lowercase())
                .collect::<String>();
            let handler = Handler(format!("c{}-{suffix}", self.next));
            // CORRECTNESS: A handler must not collide with a live or pending one.
            if !self.index.contains_key(&handler) && !self.pending.contains_key(&handler) {
                self.pending.insert(handler.clone(), self.next);
                return handler;
            }
        }
    }

    /// Releases a pending handler whose connection was never created.
    pub fn abandon(&mut self, handler: &Handler) -> bool {
        self.pending.remove(handler).is_some()
    }

    /// Makes a connection live under its pending handler.
    pub fn create(&mut self, connection: Connection) -> Result<&Connection, RegistryError> {
        let seq = self
            .pending
            .remove(&connection.handler)
            .ok_or_else(|| RegistryError::NotPending(connection.handler.clone()))?;
        self.index.insert(connection.handler.clone(), seq);
        Ok(self.live.entry(seq).or_insert(connection))
    }

    /// Returns live connections in creation order.
    pub fn list(&self) -> Vec<Connection> {
        self.live.values().cloned().collect()
    }

    pub fn get(&self, handler: &Handler) -> Option<&Connection> {
        self.index.get(handler).and_then(|seq| self.live.get(seq))
    }

    /// Removes a live connection, handing back the rules it owns.
    pub fn remove(&mut self, handler: &Handler) -> Result<Connection, RegistryError> {
        self.index
            .remove(handler)
            .and_then(|seq| self.live.remove(&seq))
            .ok_or_else(|| RegistryError::UnknownHandler(handler.clone()))
    }

    /// Returns the handlers of connections that have expired by `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<Handler> {
        self.live
            .values()
            .filter(|c| c.is_expired(now))
            .map(|c| c.handler.clone())
            .collect()
    }

    delegate::delegate! {
        to self.live {
            /// Returns the number of live connections.
            pub fn len(&self) -> usize;

            /// Returns true if there are no live connections.
            pub fn is_empty(&self) -> bool;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No live connection has this handler.
    #[error("no connection with handler {0}")]
    UnknownHandler(Handler),

    #[error("handler {0} was not allocated or is already in use")]
    NotPending(Handler),
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rustc_hash::FxHashSet;

    use super::*;

    fn connection(handler: &Handler, expires_at: Option<DateTime<Utc>>) -> Connection {
        Connection {
            handler: handler.clone(),
            student: StudentCode::new(20201234),
            server: "srv-ssh".into(),
            service: "ssh".into(),
            flows: vec![format!("{handler}_fw_0"), format!("{handler}_arp_fw_0")],
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn handlers_are_unique() {
        let mut registry = ConnectionRegistry::with_seed(0);
        let handlers = (0..1000)
            .map(|_| registry.allocate())
            .collect::<FxHashSet<_>>();
        assert_eq!(handlers.len(), 1000);
        assert!(handlers.iter().all(|h| !h.as_str().contains(NAME_SEP)));
    }

    #[test]
    fn removed_handlers_are_not_reissued() -> anyhow::Result<()> {
        let mut registry = ConnectionRegistry::with_seed(7);
        let first = registry.allocate();
        registry.create(connection(&first, None))?;
        registry.remove(&first)?;
        let mut reseeded = ConnectionRegistry::with_seed(7);
        assert_eq!(reseeded.allocate(), first);
        assert_ne!(registry.allocate(), first);
        Ok(())
    }

    #[test]
    fn pending_handlers_are_not_listed() {
        let mut registry = ConnectionRegistry::with_seed(0);
        let _ = registry.allocate();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn create_requires_allocation() {
        let mut registry = ConnectionRegistry::with_seed(0);
        let handler: Handler = "c99-zzzzzz".parse().unwrap();
        assert_eq!(
            registry.create(connection(&handler, None)),
            Err(RegistryError::NotPending(handler))
        );
    }

    #[test]
    fn create_twice_fails() -> anyhow::Result<()> {
        let mut registry = ConnectionRegistry::with_seed(0);
        let handler = registry.allocate();
        registry.create(connection(&handler, None))?;
        assert!(registry.create(connection(&handler, None)).is_err());
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[test]
    fn abandoned_handlers_cannot_be_created() {
        let mut registry = ConnectionRegistry::with_seed(0);
        let handler = registry.allocate();
        assert!(registry.abandon(&handler));
        assert!(!registry.abandon(&handler));
        assert!(registry.create(connection(&handler, None)).is_err());
    }

    #[test]
    fn list_follows_creation_order() -> anyhow::Result<()> {
        let mut registry = ConnectionRegistry::with_seed(0);
        let handlers = (0..12).map(|_| registry.allocate()).collect::<Vec<_>>();
        for h in &handlers {
            registry.create(connection(h, None))?;
        }
        let listed = registry
            .list()
            .into_iter()
            .map(|c| c.handler)
            .collect::<Vec<_>>();
        assert_eq!(listed, handlers);
        Ok(())
    }

    #[test]
    fn remove_returns_owned_flows() -> anyhow::Result<()> {
        let mut registry = ConnectionRegistry::with_seed(0);
        let handler = registry.allocate();
        let created = registry.create(connection(&handler, None))?.clone();
        let removed = registry.remove(&handler)?;
        assert_eq!(removed.flows, created.flows);
        assert!(registry.get(&handler).is_none());
        assert_eq!(
            registry.remove(&handler),
            Err(RegistryError::UnknownHandler(handler))
        );
        Ok(())
    }

    #[test]
    fn expired_only_lists_past_deadlines() -> anyhow::Result<()> {
        let mut registry = ConnectionRegistry::with_seed(0);
        let now = Utc::now();
        let stale = registry.allocate();
        registry.create(connection(&stale, Some(now - Duration::seconds(1))))?;
        let fresh = registry.allocate();
        registry.create(connection(&fresh, Some(now + Duration::seconds(60))))?;
        let forever = registry.allocate();
        registry.create(connection(&forever, None))?;
        assert_eq!(registry.expired(now), vec![stale]);
        Ok(())
    }

    #[test]
    fn handler_parsing_rejects_separator() {
        assert!("c1-abc".parse::<Handler>().is_ok());
        assert!("c1_abc".parse::<Handler>().is_err());
        assert!("".parse::<Handler>().is_err());
        assert!("c1 abc".parse::<Handler>().is_err());
    }
}
