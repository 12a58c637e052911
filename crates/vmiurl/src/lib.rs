//! Resolver for `vmi://` URLs.
//!
//! Turns a URL of the form `vmi://<hypervisor>/<target>?key=value&...` into a
//! driver type selector and a typed [`DriverConfig`] that a hypervisor driver
//! session can be opened with.
//!
//! Two key sets are understood:
//!
//! - [`Grammar::Simple`]: a single `kvmi_unix_socket` key, target required in
//!   the path.
//! - [`Grammar::Extended`]: `vm_name`, `kvm_unix_socket`,
//!   `memflow_connector_name` and `memflow_connector_args`, with the target
//!   taken from the path or from `vm_name`.
//!
//! # Example
//!
//! ```rust
//! use vmiurl::{resolve, DriverType};
//!
//! let res = resolve("vmi://KVM/windows10?kvm_unix_socket=/tmp/introspector").unwrap();
//! assert_eq!(res.driver_type, Some(DriverType::KVM));
//! assert_eq!(res.config.target(), Some("windows10"));
//! assert_eq!(res.config.unix_socket(), Some("/tmp/introspector"));
//! ```

pub mod error;
pub mod parser;
pub mod types;

// Re-export key types at crate root.
pub use error::{ConfigError, ConfigResult};
pub use parser::{resolve, resolve_with, Grammar, EXTENDED_KEYS, SCHEME, SIMPLE_KEYS};
pub use types::{BackendConfig, DriverConfig, DriverType, Resolution};
