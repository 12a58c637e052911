//! MCP tool definitions for the vmistream server.

use crate::driver::DriverRegistry;
use crate::handler::{KeyedSessionCache, DEFAULT_CAPACITY};
use crate::memory::pause::with_paused;
use crate::plugins::memsearch::{self, PatternEncoding, SCAN_CHUNK_SIZE};
use crate::server::session::SessionStore;
use crate::server::types::*;
use rmcp::handler::server::{router::tool::ToolRouter, wrapper::Parameters};
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde_json::json;
use std::io::SeekFrom;
use std::sync::Arc;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest vmi_read.
const MAX_READ_LENGTH: usize = 4096;

const TOOLS: &[&str] = &[
    "vmi_open",
    "vmi_read",
    "vmi_pause",
    "vmi_resume",
    "vmi_search",
    "vmi_list_sessions",
    "vmi_get_status",
];

/// Format a byte slice as a classic hex dump with offset markers and ASCII sidebar.
fn format_hex_dump(data: &[u8], base_offset: u64) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let addr = base_offset + (i * 16) as u64;
        let _ = write!(out, "{:08x}  ", addr);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                out.push(' ');
            }
            let _ = write!(out, "{:02x} ", byte);
        }
        // Pad if last line is short
        for j in chunk.len()..16 {
            if j == 8 {
                out.push(' ');
            }
            out.push_str("   ");
        }

        out.push(' ');
        out.push('|');
        for &b in chunk {
            if b.is_ascii_graphic() || b == b' ' {
                out.push(b as char);
            } else {
                out.push('.');
            }
        }
        out.push('|');
        out.push('\n');
    }
    out
}

fn json_result(value: &impl serde::Serialize) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// The vmistream MCP server.
#[derive(Clone)]
pub struct VmiServer {
    sessions: SessionStore,
    drivers: Arc<KeyedSessionCache>,
    registered: Vec<String>,
    tool_router: ToolRouter<Self>,
}

impl Default for VmiServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl VmiServer {
    /// A server backed by the built-in drivers.
    pub fn new() -> Self {
        Self::with_registry(DriverRegistry::with_builtin())
    }

    pub fn with_registry(registry: DriverRegistry) -> Self {
        let registered = registry.registered().iter().map(|t| t.to_string()).collect();
        VmiServer {
            sessions: SessionStore::new(),
            drivers: Arc::new(KeyedSessionCache::new(registry, DEFAULT_CAPACITY)),
            registered,
            tool_router: Self::tool_router(),
        }
    }

    /// Open an introspection session.
    #[tool(description = "Open an introspection session on a virtual machine from a vmi:// URL. Returns a session_id for subsequent calls. URL form: vmi://[KVM|VirtualBox|Xen|Memflow]/[vm name]?key=value, keys: vm_name, kvm_unix_socket, memflow_connector_name, memflow_connector_args. A raw memory image can be opened with vmi://Memflow/?memflow_connector_name=raw&memflow_connector_args=/path/to/image.raw")]
    async fn vmi_open(
        &self,
        Parameters(req): Parameters<OpenRequest>,
    ) -> Result<CallToolResult, McpError> {
        info!("Opening {}", req.url);

        let resolution = vmiurl::resolve(&req.url)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let driver = self.drivers.open(&resolution).map_err(|e| {
            McpError::internal_error(format!("Failed to open session: {}", e), None)
        })?;

        let session_id = self
            .sessions
            .create_session(req.url.clone(), resolution.clone(), driver.clone())
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let max_address = driver.max_physical_address().unwrap_or_default();
        json_result(&json!({
            "session_id": session_id,
            "url": req.url,
            "name": driver.name(),
            "driver_type": driver.driver_type().to_string(),
            "config": resolution.config,
            "max_address": format!("{:#x}", max_address),
            "status": "ready"
        }))
    }

    /// Read guest-physical memory as a hex dump.
    #[tool(description = "Read guest-physical memory at an address and return a hex dump. Fields: session_id, offset (decimal or hex string like \"0x3bd8ac00\"), length (default 256, max 4096), padded (default true: unreadable pages are returned as zeros; false: fail on unreadable memory and return only the bytes the driver provided).")]
    async fn vmi_read(
        &self,
        Parameters(req): Parameters<ReadRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session_lock = self.sessions.get_session(&req.session_id).await.ok_or_else(|| {
            McpError::invalid_params(format!("Session not found: {}", req.session_id), None)
        })?;
        let mut session = session_lock.write().await;

        let length = req.length.unwrap_or(256).min(MAX_READ_LENGTH);
        let padded = req.padded.unwrap_or(true);

        let data = if padded {
            session
                .padded
                .seek(SeekFrom::Start(req.offset))
                .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
            session.padded.read(length)
        } else {
            session
                .plain
                .seek(SeekFrom::Start(req.offset))
                .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
            session
                .plain
                .read(length)
                .map_err(|e| McpError::internal_error(format!("read error: {}", e), None))?
        };

        json_result(&json!({
            "session_id": req.session_id,
            "offset": format!("{:#x}", req.offset),
            "length": data.len(),
            "padded": padded,
            "hex_dump": format_hex_dump(&data, req.offset),
        }))
    }

    /// Pause the guest.
    #[tool(description = "Pause every VCPU of the session's guest, so that subsequent reads see a consistent snapshot. Call vmi_resume afterwards. Requires session_id.")]
    async fn vmi_pause(
        &self,
        Parameters(req): Parameters<SessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session_lock = self.sessions.get_session(&req.session_id).await.ok_or_else(|| {
            McpError::invalid_params(format!("Session not found: {}", req.session_id), None)
        })?;
        let session = session_lock.write().await;

        session
            .driver
            .pause()
            .map_err(|e| McpError::internal_error(format!("pause failed: {}", e), None))?;
        session.set_paused(true);

        json_result(&json!({ "session_id": req.session_id, "paused": true }))
    }

    /// Resume the guest.
    #[tool(description = "Resume a guest paused with vmi_pause. Requires session_id.")]
    async fn vmi_resume(
        &self,
        Parameters(req): Parameters<SessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session_lock = self.sessions.get_session(&req.session_id).await.ok_or_else(|| {
            McpError::invalid_params(format!("Session not found: {}", req.session_id), None)
        })?;
        let session = session_lock.write().await;

        session
            .driver
            .resume()
            .map_err(|e| McpError::internal_error(format!("resume failed: {}", e), None))?;
        session.set_paused(false);

        json_result(&json!({ "session_id": req.session_id, "paused": false }))
    }

    /// Search guest-physical memory.
    #[tool(description = "Search the whole guest-physical address space for a pattern. Fields: session_id, pattern, encoding (ascii|utf16le|hex, default ascii), limit (default 20), context (bytes around each match, default 64), pause (pause the guest during the scan, default false).")]
    async fn vmi_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session_lock = self.sessions.get_session(&req.session_id).await.ok_or_else(|| {
            McpError::invalid_params(format!("Session not found: {}", req.session_id), None)
        })?;
        let session = session_lock.read().await;

        let encoding: PatternEncoding = req
            .encoding
            .as_deref()
            .unwrap_or("ascii")
            .parse()
            .map_err(|e: memsearch::SearchError| McpError::invalid_params(e.to_string(), None))?;
        let pattern = encoding
            .encode(&req.pattern)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let limit = req.limit.unwrap_or(20);
        let context = req.context.unwrap_or(64);
        let driver = session.driver.as_ref();
        let scan = || memsearch::run(driver, &pattern, SCAN_CHUNK_SIZE, limit, context);

        let result = if req.pause.unwrap_or(false) {
            with_paused(driver, scan)
        } else {
            scan()
        }
        .map_err(|e| McpError::internal_error(format!("search error: {}", e), None))?;

        json_result(&json!({
            "session_id": req.session_id,
            "encoding": encoding,
            "pattern": req.pattern,
            "pattern_len": result.pattern_len,
            "total_matches": result.total_matches,
            "unreadable_pages": result.unreadable_pages,
            "matches": result.matches,
        }))
    }

    /// List all open sessions.
    #[tool(description = "List all open introspection sessions with their details (URL, guest name, driver, max address, pause state, creation time).")]
    async fn vmi_list_sessions(&self) -> Result<CallToolResult, McpError> {
        let infos: Vec<SessionInfo> = self
            .sessions
            .list_sessions()
            .await
            .into_iter()
            .map(|s| SessionInfo {
                session_id: s.id,
                url: s.url,
                name: s.name,
                driver_type: s.driver_type,
                max_address: format!("{:#x}", s.max_address),
                paused: s.paused,
                created_at: s.created_at,
            })
            .collect();

        json_result(&infos)
    }

    /// Get server status.
    #[tool(description = "Get vmistream server status including version, open session count, registered drivers, and available tools.")]
    async fn vmi_get_status(&self) -> Result<CallToolResult, McpError> {
        let status = ServerStatus {
            version: VERSION.to_string(),
            active_sessions: self.sessions.count().await,
            cached_drivers: self.drivers.len(),
            registered_drivers: self.registered.clone(),
            available_tools: TOOLS.iter().map(|t| t.to_string()).collect(),
        };

        json_result(&status)
    }
}

#[tool_handler]
impl ServerHandler for VmiServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "vmistream: guest-physical memory access for virtual machines over MCP. \
                 Start by calling vmi_open with a vmi:// URL.\n\
                 Use vmi_read for hex dumps and vmi_search to scan for strings or byte patterns.\n\
                 Bracket reads with vmi_pause / vmi_resume for a consistent snapshot."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
