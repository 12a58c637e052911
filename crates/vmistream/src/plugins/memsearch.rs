//! MemSearch: scan guest-physical memory for arbitrary byte patterns.
//!
//! Walks the whole physical address space of a session in large chunks,
//! returning matching offsets with hex/ASCII context. Chunks are fetched page
//! by page, so a hole in the guest's memory map only hides the pages it
//! covers.

use crate::memory::error::DriverError;
use crate::memory::padded::read_padded;
use crate::memory::traits::DriverSession;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

/// Default chunk size for physical memory scanning (16 MB).
pub const SCAN_CHUNK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Empty search pattern")]
    EmptyPattern,

    #[error("Unknown encoding '{0}'. Use ascii, utf16le, or hex.")]
    UnknownEncoding(String),

    #[error("Invalid hex pattern: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// How a textual pattern maps to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternEncoding {
    #[default]
    Ascii,
    Utf16le,
    Hex,
}

impl PatternEncoding {
    pub fn encode(&self, pattern: &str) -> Result<Vec<u8>, SearchError> {
        let bytes = match self {
            PatternEncoding::Ascii => pattern.as_bytes().to_vec(),
            PatternEncoding::Utf16le => pattern
                .encode_utf16()
                .flat_map(|c| c.to_le_bytes())
                .collect(),
            PatternEncoding::Hex => {
                let hex_clean: String = pattern.chars().filter(|c| !c.is_whitespace()).collect();
                hex::decode(hex_clean)?
            }
        };
        if bytes.is_empty() {
            return Err(SearchError::EmptyPattern);
        }
        Ok(bytes)
    }
}

impl FromStr for PatternEncoding {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascii" => Ok(PatternEncoding::Ascii),
            "utf16le" => Ok(PatternEncoding::Utf16le),
            "hex" => Ok(PatternEncoding::Hex),
            other => Err(SearchError::UnknownEncoding(other.to_string())),
        }
    }
}

/// A single pattern match in physical memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Physical address of the match.
    pub offset: u64,
    /// Hex dump of surrounding bytes.
    pub context_hex: String,
    /// ASCII representation of surrounding bytes.
    pub context_ascii: String,
}

/// Results of a memory search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub pattern_len: usize,
    pub total_matches: usize,
    /// Pages (or page tails) that could not be read and were not searched.
    pub unreadable_pages: usize,
    pub matches: Vec<SearchHit>,
}

/// Scan the session's physical memory for `pattern`, returning up to
/// `max_results` hits.
///
/// Each hit includes `context_bytes` of surrounding data (before and after),
/// zero-padded where memory is unreadable.
pub fn run(
    session: &dyn DriverSession,
    pattern: &[u8],
    chunk_size: usize,
    max_results: usize,
    context_bytes: usize,
) -> Result<SearchResult, SearchError> {
    if pattern.is_empty() {
        return Err(SearchError::EmptyPattern);
    }

    let space_size = session.max_physical_address()?.saturating_add(1);
    let chunk_size = chunk_size.max(1);
    // Chunks overlap so matches straddling a boundary are still seen.
    let overlap = pattern.len().max(256);

    let mut hits = Vec::new();
    let mut unreadable_pages = 0;
    let mut offset: u64 = 0;

    while offset < space_size && hits.len() < max_results {
        let remaining = space_size - offset;
        let read_len = (chunk_size + overlap).min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let main_len = chunk_size.min(read_len);
        let mut chunk = vec![0u8; read_len];
        let mut holes = read_padded(session, offset, &mut chunk[..main_len]);
        unreadable_pages += holes.len();
        holes.extend(read_padded(
            session,
            offset + main_len as u64,
            &mut chunk[main_len..],
        ));
        if !holes.is_empty() {
            trace!("memsearch: {} hole(s) in chunk at {:#x}", holes.len(), offset);
        }

        let first_byte = pattern[0];
        let mut pos = 0;
        while pos + pattern.len() <= chunk.len() && hits.len() < max_results {
            let rel = match memchr::memchr(first_byte, &chunk[pos..]) {
                Some(r) => r,
                None => break,
            };
            let abs = pos + rel;
            if abs + pattern.len() > chunk.len() {
                break;
            }
            // Matches starting in the overlap belong to the next chunk.
            if abs >= chunk_size {
                break;
            }

            let phys_offset = offset + abs as u64;
            let phys_end = phys_offset + pattern.len() as u64;
            // Zero-fill is not guest content.
            let in_hole = holes
                .iter()
                .any(|h| h.start < phys_end && phys_offset < h.end);

            if !in_hole && chunk[abs..abs + pattern.len()] == *pattern {
                let ctx_start = phys_offset.saturating_sub(context_bytes as u64);
                let ctx_len = ((context_bytes * 2 + pattern.len()) as u64)
                    .min(space_size.saturating_sub(ctx_start)) as usize;
                let mut ctx_data = vec![0u8; ctx_len];
                read_padded(session, ctx_start, &mut ctx_data);

                hits.push(SearchHit {
                    offset: phys_offset,
                    context_hex: hex_dump_inline(&ctx_data),
                    context_ascii: printable_ascii(&ctx_data),
                });
            }

            pos = abs + 1;
        }

        offset = offset.saturating_add(chunk_size as u64);
    }

    debug!(
        "memsearch on '{}': {} match(es), {} unreadable page(s)",
        session.name(),
        hits.len(),
        unreadable_pages
    );

    Ok(SearchResult {
        pattern_len: pattern.len(),
        total_matches: hits.len(),
        unreadable_pages,
        matches: hits,
    })
}

/// One-line hex string (space-separated bytes).
fn hex_dump_inline(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

/// Convert bytes to printable ASCII (non-printable becomes '.').
fn printable_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}
