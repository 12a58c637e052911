//! Request/response types for MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Deserialize a u64 that accepts decimal numbers, hex strings ("0x1ad000"),
/// or plain decimal strings ("1234").
fn deserialize_u64_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom("expected unsigned 64-bit integer")),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).map_err(de::Error::custom)
            } else {
                s.parse::<u64>().map_err(de::Error::custom)
            }
        }
        _ => Err(de::Error::custom("expected number or hex string")),
    }
}

/// Request to open a guest.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct OpenRequest {
    /// vmi:// URL, e.g. "vmi://KVM/win10?kvm_unix_socket=/tmp/introspector".
    pub url: String,
}

/// Request to read guest-physical memory.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadRequest {
    /// Session ID from a previous vmi_open call.
    pub session_id: String,
    /// Physical address. Accepts decimal or hex ("0x1000").
    #[serde(deserialize_with = "deserialize_u64_hex")]
    #[schemars(with = "serde_json::Value")]
    pub offset: u64,
    /// Bytes to read (default 256, max 4096).
    pub length: Option<usize>,
    /// Zero-fill unreadable pages instead of failing (default true).
    pub padded: Option<bool>,
}

/// Request requiring only a session ID.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionRequest {
    /// Session ID from a previous vmi_open call.
    pub session_id: String,
}

/// Request to search guest-physical memory.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchRequest {
    /// Session ID from a previous vmi_open call.
    pub session_id: String,
    /// Pattern text.
    pub pattern: String,
    /// "ascii" (default), "utf16le" or "hex".
    pub encoding: Option<String>,
    /// Maximum number of matches (default 20).
    pub limit: Option<usize>,
    /// Context bytes around each match (default 64).
    pub context: Option<usize>,
    /// Pause the guest for the duration of the scan (default false).
    pub pause: Option<bool>,
}

/// Session information for listing.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    pub session_id: String,
    pub url: String,
    pub name: String,
    pub driver_type: String,
    pub max_address: String,
    pub paused: bool,
    pub created_at: String,
}

/// Server status response.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ServerStatus {
    pub version: String,
    pub active_sessions: usize,
    pub cached_drivers: usize,
    pub registered_drivers: Vec<String>,
    pub available_tools: Vec<String>,
}
