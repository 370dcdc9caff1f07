//! Stateless decoder from one raw syslog text line to a [`Record`].
//!
//! The decoder consumes no ambient state except an optional interface
//! resolver snapshot; it is pure and safe to call from any thread,
//! concurrently, without synchronization — this is what lets the filter
//! engine call it directly from worker threads instead of funneling
//! everything through the chunk loader.

use ahash::AHashMap;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use md5::{Digest, Md5};

use crate::record::{Record, Timestamp, DEFAULT_HOST};
use crate::resolver::InterfaceResolver;

/// Substring that must appear in the syslog program token for a line to
/// be considered a firewall log record at all.
const FILTERLOG_TOKEN: &str = "filterlog";

/// Positional field names for grammar version 1, in CSV order. Index `i`
/// here is the field assigned to CSV column `i` (see the table in the
/// component design doc for which columns are conditionally present).
const FIELD_ORDER: &[&str] = &[
    "rulenr",     // 0
    "subrulenr",  // 1
    "anchorname", // 2
    "rid",        // 3
    "interface",  // 4
    "reason",     // 5
    "action",     // 6
    "dir",        // 7
    "ipversion",  // 8
    "tos",        // 9
    "ecn",        // 10
    "ttl",        // 11
    "id",         // 12
    "offset",     // 13
    "ipflags",    // 14
    "protonum",   // 15
    "protoname",  // 16
    "length",     // 17
    "src",        // 18
    "dst",        // 19
    "srcport",    // 20
    "dstport",    // 21
    "datalen",    // 22
    "tcpflags",   // 23
    "seq",        // 24
    "ack",        // 25
    "urp",        // 26
    "tcpopts",    // 27
];

/// Decode one raw text line into a [`Record`], or `None` if the line is
/// not a firewall filterlog record.
///
/// `interface_resolver` is consulted to populate `interface_display`;
/// passing `None` leaves it equal to the physical interface name.
pub fn decode_line(line: &str, interface_resolver: Option<&dyn InterfaceResolver>) -> Option<Record> {
    if !line.contains(FILTERLOG_TOKEN) {
        return None;
    }

    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let timestamp_str = tokens[0];
    let host = DEFAULT_HOST.to_string();

    let filterlog_idx = tokens.iter().position(|t| t.contains(FILTERLOG_TOKEN))?;
    if filterlog_idx + 1 > tokens.len() {
        return None;
    }

    // Reassemble the remainder of the line after the filterlog token,
    // preserving original spacing by slicing the raw line rather than
    // re-joining the whitespace-split tokens.
    let payload = payload_after_token(line, tokens[filterlog_idx]);

    let fields = parse_fields(payload);
    if !fields.contains_key("action") {
        return None;
    }

    let mut fields = fields;
    if let Some(physical) = fields.get("interface").cloned() {
        let display = interface_resolver
            .and_then(|r| r.resolve(&physical))
            .unwrap_or_else(|| physical.clone());
        fields.insert("interface_display".to_string(), display);
    }

    let digest = md5_hex(line.as_bytes());
    let timestamp = parse_timestamp(timestamp_str);

    Some(Record {
        raw_line: line.to_string(),
        fields,
        timestamp,
        host,
        digest,
    })
}

/// Finds `token`'s first occurrence in `line` (by its position among the
/// whitespace-split tokens landing at the same byte offset) and returns
/// everything after the colon that follows it, trimmed.
fn payload_after_token<'a>(line: &'a str, token: &str) -> &'a str {
    match line.find(token) {
        Some(pos) => {
            let after = &line[pos + token.len()..];
            after.strip_prefix(':').unwrap_or(after).trim_start()
        }
        None => "",
    }
}

fn parse_fields(payload: &str) -> AHashMap<String, String> {
    let mut rule = AHashMap::new();
    let raw_fields: Vec<&str> = payload.split(',').map(str::trim).collect();

    for (idx, name) in FIELD_ORDER.iter().enumerate() {
        match idx {
            0..=8 => {
                rule.insert((*name).to_string(), raw_fields.get(idx).copied().unwrap_or("").to_string());
            }
            9..=19 => {
                if rule.get("ipversion").map(String::as_str) == Some("4") {
                    rule.insert((*name).to_string(), raw_fields.get(idx).copied().unwrap_or("").to_string());
                }
            }
            20..=22 => {
                if matches!(rule.get("protonum").map(String::as_str), Some("6") | Some("17")) {
                    rule.insert((*name).to_string(), raw_fields.get(idx).copied().unwrap_or("").to_string());
                }
            }
            23..=27 => {
                if rule.get("protonum").map(String::as_str) == Some("6") {
                    rule.insert((*name).to_string(), raw_fields.get(idx).copied().unwrap_or("").to_string());
                }
            }
            _ => unreachable!("FIELD_ORDER has exactly 28 entries"),
        }
    }

    if let Some(protonum) = rule.get("protonum").cloned() {
        let protoname = match protonum.as_str() {
            "6" => "tcp",
            "17" => "udp",
            "1" => "icmp",
            "112" => "carp",
            other => other,
        };
        rule.insert("protoname".to_string(), protoname.to_string());
    }

    rule
}

fn parse_timestamp(raw: &str) -> Timestamp {
    if raw.contains('T') {
        let normalized = raw.replacen('T', " ", 1);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S") {
            return Timestamp::Parsed(Utc.from_utc_datetime(&naive));
        }
    } else {
        let this_year = Utc::now().format("%Y").to_string();
        let with_year = format!("{} {}", this_year, raw);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S") {
            return Timestamp::Parsed(Utc.from_utc_datetime(&naive));
        }
    }
    Timestamp::Synthetic(Utc::now())
}

/// Lowercase-hex MD5 digest of `bytes`. MD5 is used here purely for
/// interoperability with existing operator tooling that keys on it, not
/// for any security property.
fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[allow(dead_code)]
fn _assert_timestamp_instant_type(_t: &DateTime<Utc>) {}
