//! Introspection session management.

use crate::memory::error::StreamResult;
use crate::memory::padded::PaddedMemoryStream;
use crate::memory::stream::MemoryStream;
use crate::memory::traits::DriverSession;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use vmiurl::Resolution;

/// An open guest, as seen by MCP clients.
pub struct VmiSession {
    /// Unique session ID.
    pub id: String,
    /// URL the session was opened with.
    pub url: String,
    pub resolution: Resolution,
    pub driver: Arc<dyn DriverSession>,
    /// Stream used for exact reads.
    pub plain: MemoryStream,
    /// Stream used for zero-padded reads.
    pub padded: PaddedMemoryStream,
    /// Pause state of the guest, shared by every session on the same driver.
    paused: Arc<AtomicBool>,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl VmiSession {
    pub fn new(
        id: String,
        url: String,
        resolution: Resolution,
        driver: Arc<dyn DriverSession>,
    ) -> StreamResult<Self> {
        Ok(VmiSession {
            id,
            url,
            resolution,
            plain: MemoryStream::new(driver.clone())?,
            padded: PaddedMemoryStream::new(driver.clone())?,
            driver,
            paused: Arc::new(AtomicBool::new(false)),
            created_at: chrono::Utc::now(),
        })
    }

    pub fn max_address(&self) -> u64 {
        self.padded.max_address()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Record the guest's pause state for all sessions sharing the driver.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn shares_driver(&self, driver: &Arc<dyn DriverSession>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.driver), Arc::as_ptr(driver))
    }
}

/// Summary row for session listings.
pub struct SessionSummary {
    pub id: String,
    pub url: String,
    pub name: String,
    pub driver_type: String,
    pub max_address: u64,
    pub paused: bool,
    pub created_at: String,
}

/// Global session store.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<RwLock<VmiSession>>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a new session and return its ID.
    ///
    /// A session opened on a driver that is already in use joins the pause
    /// state of the existing sessions on that driver.
    pub async fn create_session(
        &self,
        url: String,
        resolution: Resolution,
        driver: Arc<dyn DriverSession>,
    ) -> StreamResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut session = VmiSession::new(id.clone(), url, resolution, driver)?;
        let mut sessions = self.sessions.write().await;
        for other in sessions.values() {
            let other = other.read().await;
            if other.shares_driver(&session.driver) {
                session.paused = other.paused.clone();
                break;
            }
        }
        sessions.insert(id.clone(), Arc::new(RwLock::new(session)));
        Ok(id)
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &str) -> Option<Arc<RwLock<VmiSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// List all sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut result = Vec::new();
        for (id, session_lock) in sessions.iter() {
            let session = session_lock.read().await;
            result.push((
                session.created_at,
                SessionSummary {
                    id: id.clone(),
                    url: session.url.clone(),
                    name: session.driver.name().to_string(),
                    driver_type: session.driver.driver_type().to_string(),
                    max_address: session.max_address(),
                    paused: session.is_paused(),
                    created_at: session.created_at.to_rfc3339(),
                },
            ));
        }
        result.sort_by_key(|(created, _)| *created);
        result.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Get session count.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
