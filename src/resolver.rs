//! Read-only name-resolution callbacks injected by the host.
//!
//! The core never populates these mappings itself — that is the job of
//! the (out-of-scope) XML configuration parser and remote label-fetching
//! client the host owns. The core only ever reads through them.
//!
//! Every resolver trait requires `Send + Sync` so an `Arc<dyn Resolver>`
//! can be cloned into filter-engine worker jobs and called directly from
//! any thread; unlike a host written in a GC'd language with callbacks
//! that must be pickled across a process boundary, a native resolver
//! needs no separate "frozen snapshot" representation — cloning the
//! `Arc` already gives each worker its own reference to the same
//! immutable mapping, and the resolver handed to a job is the one in
//! effect at the moment `apply_filter` started regardless of whether the
//! host later swaps it in (see [`crate::store::VirtualStore::set_interface_resolver`]).

use ahash::AHashMap;

/// Resolves a physical interface name (e.g. `em0`) to a host-chosen
/// display name (e.g. `LAN`).
pub trait InterfaceResolver: Send + Sync {
    fn resolve(&self, physical: &str) -> Option<String>;
}

/// Resolves a 32-character lowercase-hex rule id to a human-readable
/// rule-label description.
pub trait RuleLabelResolver: Send + Sync {
    fn resolve(&self, rid_hex: &str) -> Option<String>;
}

/// Resolves IP addresses and ports to alias names for display purposes.
/// Not consulted by predicate evaluation except through the `__label__`
/// pseudo-field's dependency on the rule-label resolver; this resolver
/// exists purely for host-side field enrichment.
pub trait AliasResolver: Send + Sync {
    fn resolve_ip(&self, addr: &str) -> Option<String>;
    fn resolve_port(&self, port: &str) -> Option<String>;
}

/// A plain `HashMap`-backed [`InterfaceResolver`], handy for tests and
/// for hosts that already have the mapping fully materialized.
#[derive(Debug, Default, Clone)]
pub struct MapInterfaceResolver(pub AHashMap<String, String>);

impl InterfaceResolver for MapInterfaceResolver {
    fn resolve(&self, physical: &str) -> Option<String> {
        self.0.get(physical).cloned()
    }
}

/// A plain `HashMap`-backed [`RuleLabelResolver`].
#[derive(Debug, Default, Clone)]
pub struct MapRuleLabelResolver(pub AHashMap<String, String>);

impl RuleLabelResolver for MapRuleLabelResolver {
    fn resolve(&self, rid_hex: &str) -> Option<String> {
        self.0.get(rid_hex).cloned()
    }
}

/// A plain `HashMap`-backed [`AliasResolver`].
#[derive(Debug, Default, Clone)]
pub struct MapAliasResolver {
    pub ips: AHashMap<String, String>,
    pub ports: AHashMap<String, String>,
}

impl AliasResolver for MapAliasResolver {
    fn resolve_ip(&self, addr: &str) -> Option<String> {
        self.ips.get(addr).cloned()
    }

    fn resolve_port(&self, port: &str) -> Option<String> {
        self.ports.get(port).cloned()
    }
}
