//! Capability-based permission system for sandboxed execution.
//!
//! Capabilities gate the guarded stdlib surfaces named in `spec.md` §4.7
//! (`boto3`, `sql`, `network`, filesystem) at the point where a builtin
//! module function is about to perform the operation it wraps. Denied access
//! degrades to a stub: the module still imports and its names are still
//! visible to `dir()`, but calling a guarded function raises `PermissionError`.

use std::fmt;

/// A single permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Outbound network access (`requests`, `fastapi` client calls).
    Network,
    /// Access restricted to a specific host (checked in addition to `Network`).
    NetworkHost(String),
    /// The `boto3` guarded module surface.
    Boto3,
    /// The `sql` guarded module surface.
    Sql,
    /// Filesystem reads/writes routed through `Filesystem`.
    FileRead,
    FileWrite,
    /// Custom capability identified by a string key, for embedder-defined modules.
    Custom(String),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::NetworkHost(host) => write!(f, "network:{host}"),
            Self::Boto3 => f.write_str("boto3"),
            Self::Sql => f.write_str("sql"),
            Self::FileRead => f.write_str("file:read"),
            Self::FileWrite => f.write_str("file:write"),
            Self::Custom(key) => write!(f, "custom:{key}"),
        }
    }
}

/// A set of granted capabilities for a run. Immutable once built: a script
/// cannot escalate its own permissions mid-execution.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    capabilities: Vec<Capability>,
}

impl CapabilitySet {
    #[must_use]
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }

    /// Denies every guarded operation; the script can still compute freely.
    #[must_use]
    pub fn none() -> Self {
        Self { capabilities: Vec::new() }
    }

    /// Grants every guarded operation, for trusted embedding contexts.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self {
            capabilities: vec![Capability::Network, Capability::Boto3, Capability::Sql, Capability::FileRead, Capability::FileWrite],
        }
    }

    pub fn allows(&self, cap: &Capability) -> bool {
        self.capabilities.iter().any(|c| c == cap)
    }

    /// `Network` permission, further narrowed by an allowed-host allowlist
    /// when any `NetworkHost` entries are present (spec.md §4.7 "network").
    pub fn allows_network_host(&self, host: &str) -> bool {
        if !self.capabilities.contains(&Capability::Network) {
            return false;
        }
        let hosts: Vec<&str> = self
            .capabilities
            .iter()
            .filter_map(|c| if let Capability::NetworkHost(h) = c { Some(h.as_str()) } else { None })
            .collect();
        hosts.is_empty() || hosts.contains(&host)
    }

    pub fn as_slice(&self) -> &[Capability] {
        &self.capabilities
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.capabilities.is_empty() {
            return f.write_str("CapabilitySet(none)");
        }
        f.write_str("CapabilitySet(")?;
        for (i, cap) in self.capabilities.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{cap}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_denies_everything() {
        let caps = CapabilitySet::none();
        assert!(!caps.allows(&Capability::Network));
        assert!(!caps.allows_network_host("example.com"));
    }

    #[test]
    fn host_allowlist_narrows_network() {
        let caps = CapabilitySet::new(vec![Capability::Network, Capability::NetworkHost("api.example.com".into())]);
        assert!(caps.allows_network_host("api.example.com"));
        assert!(!caps.allows_network_host("evil.example.com"));
    }
}
