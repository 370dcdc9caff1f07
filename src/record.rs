//! The parsed, immutable unit that flows out of the grammar decoder and
//! through filtering, caching, and display.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default syslog host recorded when the line carries no richer host token.
pub const DEFAULT_HOST: &str = "opnsense";

/// A record's timestamp, tagged so a parse failure can never be confused
/// with a genuinely-parsed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timestamp {
    /// Successfully parsed from the line's leading token.
    Parsed(DateTime<Utc>),
    /// The token failed to parse; this is the ingest-time fallback.
    Synthetic(DateTime<Utc>),
}

impl Timestamp {
    /// The instant to use for ordering and time-window filtering, regardless
    /// of whether it was parsed or synthesized.
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Timestamp::Parsed(t) | Timestamp::Synthetic(t) => *t,
        }
    }

    /// True if this timestamp is a synthetic ingest-time fallback rather
    /// than a value parsed from the log line.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Timestamp::Synthetic(_))
    }
}

/// A single successfully decoded firewall log entry.
///
/// `fields` holds every positional field assigned by the grammar decoder
/// (see the field table in the crate's grammar module), plus the derived
/// `interface_display` and `protoname` entries. Unknown field lookups
/// resolve to an empty string rather than erroring — this mirrors the
/// predicate language's "unknown fields are never an error" rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// The original text line, without its trailing newline.
    pub raw_line: String,
    /// Positional and derived fields, keyed by name.
    pub fields: AHashMap<String, String>,
    /// The record's timestamp, parsed or synthetic.
    pub timestamp: Timestamp,
    /// The syslog host token (or [`DEFAULT_HOST`] when absent).
    pub host: String,
    /// 128-bit content digest of `raw_line`, as a lowercase hex string.
    pub digest: String,
}

impl Record {
    /// Looks up a field by name, returning an empty string for anything
    /// not present rather than an `Option`. This matches the predicate
    /// language's field-addressing semantics (§4.5): unknown fields are
    /// never an error.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Whether `timestamp` is a synthetic ingest-time fallback.
    pub fn timestamp_synthetic(&self) -> bool {
        self.timestamp.is_synthetic()
    }
}
