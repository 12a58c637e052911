//! Sessions memoized by resolved configuration.

use crate::driver::DriverRegistry;
use crate::handler::HandlerResult;
use crate::memory::error::DriverResult;
use crate::memory::padded::PaddedMemoryStream;
use crate::memory::traits::DriverSession;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};
use vmiurl::{DriverConfig, DriverType, Grammar, Resolution};

type SessionKey = (Option<DriverType>, DriverConfig);

/// Default number of sessions kept open.
pub const DEFAULT_CAPACITY: usize = 16;

/// Opens one session per distinct resolved configuration.
///
/// URLs that resolve to the same driver type and config share a session;
/// anything else gets its own. The least recently used session is dropped
/// once `capacity` is exceeded (streams still holding it keep it alive).
pub struct KeyedSessionCache {
    registry: DriverRegistry,
    grammar: Grammar,
    sessions: Mutex<LruCache<SessionKey, Arc<dyn DriverSession>>>,
}

impl KeyedSessionCache {
    pub fn new(registry: DriverRegistry, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        KeyedSessionCache {
            registry,
            grammar: Grammar::default(),
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// The session for `resolution`, opened on first use.
    pub fn open(&self, resolution: &Resolution) -> DriverResult<Arc<dyn DriverSession>> {
        let key = (resolution.driver_type, resolution.config.clone());
        let mut sessions = self.sessions.lock();

        if let Some(session) = sessions.get(&key) {
            debug!("Session cache hit: '{}'", session.name());
            return Ok(session.clone());
        }

        let session = self
            .registry
            .open(resolution.driver_type, &resolution.config)?;
        if let Some((_, evicted)) = sessions.push(key, session.clone()) {
            info!("Evicted session '{}' from cache", evicted.name());
        }
        Ok(session)
    }

    /// Resolve `uri` and return a padded stream over its session.
    pub fn handle(&self, uri: &str) -> HandlerResult<PaddedMemoryStream> {
        let resolution = vmiurl::resolve_with(uri, self.grammar)?;
        let session = self.open(&resolution)?;
        Ok(PaddedMemoryStream::new(session)?)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
