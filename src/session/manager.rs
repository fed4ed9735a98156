//! Per-`callSid` session actor registry: a `DashMap` keyed lookup replacing a
//! process-global singleton, since a single process now bridges many concurrent calls.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BridgeConfig;
use crate::functions::FunctionRegistry;
use crate::session::actor::{self, SessionHandle};

/// Tracks one live session actor per `callSid`. Actors are spawned lazily on the
/// first `start` frame for a call and drop out of the map once their task exits.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, SessionHandle>>,
    config: Arc<BridgeConfig>,
    functions: Arc<FunctionRegistry>,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(config: Arc<BridgeConfig>, functions: Arc<FunctionRegistry>, shutdown: CancellationToken) -> Self {
        Self { sessions: Arc::new(DashMap::new()), config, functions, shutdown }
    }

    /// Look up an existing actor for `call_sid`, spawning one if this is the first
    /// frame seen for this call.
    pub fn get_or_create(&self, call_sid: &str) -> SessionHandle {
        if let Some(existing) = self.sessions.get(call_sid) {
            return existing.clone();
        }
        let sessions = self.sessions.clone();
        let exit_call_sid = call_sid.to_string();
        let handle = actor::spawn(
            call_sid.to_string(),
            self.config.clone(),
            self.functions.clone(),
            self.shutdown.child_token(),
            move || {
                sessions.remove(&exit_call_sid);
            },
        );
        self.sessions.insert(call_sid.to_string(), handle.clone());
        info!(call_sid, "spawned session actor");
        handle
    }

    pub fn get(&self, call_sid: &str) -> Option<SessionHandle> {
        self.sessions.get(call_sid).map(|e| e.clone())
    }

    /// Drop the map entry for a finished call. The actor task itself decides when
    /// it's done (telephony closed and no observers left); this just stops new
    /// lookups from handing out a stale handle.
    pub fn remove(&self, call_sid: &str) {
        self.sessions.remove(call_sid);
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    fn test_config() -> Arc<BridgeConfig> {
        Arc::new(BridgeConfig::parse_from(std::iter::once("callbridge")))
    }

    fn new_manager() -> SessionManager {
        SessionManager::new(
            test_config(),
            Arc::new(FunctionRegistry::with_defaults()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing_handle_for_same_call_sid() {
        let manager = new_manager();
        let a = manager.get_or_create("CA1");
        let b = manager.get_or_create("CA1");
        assert_eq!(a.call_sid, b.call_sid);
        assert_eq!(manager.active_count(), 1);
    }

    #[tokio::test]
    async fn distinct_call_sids_get_distinct_actors() {
        let manager = new_manager();
        manager.get_or_create("CA1");
        manager.get_or_create("CA2");
        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test]
    async fn remove_drops_the_map_entry() {
        let manager = new_manager();
        manager.get_or_create("CA1");
        manager.remove("CA1");
        assert!(manager.get("CA1").is_none());
    }
}
