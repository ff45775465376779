//! Human-readable byte quantities.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<size>[0-9.]+)\s?(?<unit>[KMG]?B)?$").expect("size pattern is valid")
});

/// A cache size as written in configuration: a byte count or a string with a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheSizeSetting {
    Bytes(u64),
    Text(String),
}

impl CacheSizeSetting {
    pub fn to_bytes(&self) -> Result<u64> {
        match self {
            CacheSizeSetting::Bytes(bytes) => Ok(*bytes),
            CacheSizeSetting::Text(text) => parse_max_cache_size(text),
        }
    }
}

/// Parse a size such as `"512"`, `"10 MB"` or `"1.5GB"` into bytes.
///
/// Units are binary multiples; a bare number is bytes.
pub fn parse_max_cache_size(value: &str) -> Result<u64> {
    let invalid = |reason: String| Error::InvalidCacheSize {
        value: value.to_string(),
        reason,
    };

    let captures = SIZE_PATTERN
        .captures(value.trim())
        .ok_or_else(|| invalid("expected a number followed by an optional unit".to_string()))?;

    let size_text = &captures["size"];
    if size_text.matches('.').count() > 1 {
        return Err(invalid("multiple decimal points in size".to_string()));
    }
    let size: f64 = size_text
        .parse()
        .map_err(|_| invalid(format!("{} is not a number", size_text)))?;

    let multiplier: f64 = match captures.name("unit").map(|m| m.as_str()) {
        Some("KB") => 1024.0,
        Some("MB") => 1024.0 * 1024.0,
        Some("GB") => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };

    Ok((size * multiplier).round() as u64)
}

/// Format a byte count, scaling through B, KB, MB and GB.
pub fn format_cache_size(bytes: u64, decimals: usize) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.*} {}", decimals, size, UNITS[unit])
}
