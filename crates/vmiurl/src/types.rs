//! Driver selection and initialization parameters.

use crate::error::ConfigError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Hypervisor backends a session can be opened against.
///
/// Names are matched case-sensitively against the URL authority.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DriverType {
    KVM,
    VirtualBox,
    Xen,
    Memflow,
}

impl DriverType {
    /// Every driver type, in auto-detection order.
    pub const ALL: [DriverType; 4] = [
        DriverType::KVM,
        DriverType::VirtualBox,
        DriverType::Xen,
        DriverType::Memflow,
    ];

    /// The name used in `vmi://<name>/...`.
    pub fn name(&self) -> &'static str {
        match self {
            DriverType::KVM => "KVM",
            DriverType::VirtualBox => "VirtualBox",
            DriverType::Xen => "Xen",
            DriverType::Memflow => "Memflow",
        }
    }

    /// All valid names, in declaration order.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|d| d.name()).collect()
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| ConfigError::UnknownHypervisor {
                name: s.to_string(),
                valid: Self::names(),
            })
    }
}

/// Backend-specific initialization block.
///
/// At most one backend can be configured per session, so this is a tagged
/// union rather than a set of optional blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    #[default]
    None,
    /// KVMi introspection socket.
    KvmSocket { unix_socket: String },
    /// Memory-forwarding connector, selected by name.
    Connector { name: String, args: Vec<String> },
}

impl BackendConfig {
    /// Short name of the populated block, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::None => "none",
            BackendConfig::KvmSocket { .. } => "kvm socket",
            BackendConfig::Connector { .. } => "memflow connector",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BackendConfig::None)
    }
}

/// Initialization parameters handed to a driver when a session is opened.
///
/// Built once by the resolver and never mutated afterwards. `Hash` and `Eq`
/// make it usable as a session cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DriverConfig {
    /// Name or ID of the virtual machine.
    pub target: Option<String>,
    pub backend: BackendConfig,
}

impl DriverConfig {
    pub fn new(target: impl Into<String>) -> Self {
        DriverConfig {
            target: Some(target.into()),
            backend: BackendConfig::None,
        }
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// KVMi socket path, if the KVM block is populated.
    pub fn unix_socket(&self) -> Option<&str> {
        match &self.backend {
            BackendConfig::KvmSocket { unix_socket } => Some(unix_socket),
            _ => None,
        }
    }

    /// Connector name and arguments, if the connector block is populated.
    pub fn connector(&self) -> Option<(&str, &[String])> {
        match &self.backend {
            BackendConfig::Connector { name, args } => Some((name, args)),
            _ => None,
        }
    }

    /// True when neither a target nor a backend block is set.
    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.backend.is_none()
    }
}

/// Output of the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// `None` lets the driver registry auto-detect the hypervisor.
    pub driver_type: Option<DriverType>,
    pub config: DriverConfig,
}
