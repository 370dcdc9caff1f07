//! # filterlog-store
//!
//! A streaming, filterable record store for firewall `filterlog` text
//! logs (OPNsense/pfSense-style). Turns a multi-gigabyte append-only log
//! file into a randomly-addressable, predicate-filterable sequence of
//! parsed records without loading the file into memory.
//!
//! ## Architecture
//!
//! The crate is organized into focused modules, leaves first:
//! - `record`: the immutable parsed log entry.
//! - `grammar`: the stateless line decoder for the `filterlog` CSV grammar.
//! - `index`: the line-offset index built by a single linear scan.
//! - `cache`: the thread-safe bounded LRU chunk cache.
//! - `chunk`: resolves a chunk id to decoded records, reading through the cache.
//! - `predicate`: the field/operator/value filter expression language.
//! - `filter`: parallel predicate evaluation across an entire file.
//! - `resolver`: host-supplied name-resolution traits.
//! - `config`: runtime tunables and their defaults.
//! - `store`: the facade tying everything together.
//! - `error`: the error taxonomy shared by every fallible operation.
//!
//! ## Logging
//!
//! This crate emits [`tracing`] events at module boundaries; it never
//! installs a subscriber itself. Hosts that want output should call
//! `tracing_subscriber::fmt::init()` (or equivalent) before using the
//! store.

mod cache;
mod chunk;
mod config;
mod error;
mod filter;
mod grammar;
mod index;
mod predicate;
mod record;
mod resolver;
mod store;

pub use cache::CacheMemoryInfo;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use index::CancelToken;
pub use predicate::{Condition, ConditionSpec, Connective, Operator, Predicate, PredicateSpec, TimeWindow};
pub use record::{Record, Timestamp};
pub use resolver::{
    AliasResolver, InterfaceResolver, MapAliasResolver, MapInterfaceResolver, MapRuleLabelResolver,
    RuleLabelResolver,
};
pub use store::{MemoryInfo, VirtualStore};
