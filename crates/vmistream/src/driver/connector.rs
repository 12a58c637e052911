//! Memory-forwarding connector driver.
//!
//! Sessions opened by [`DriverType::Memflow`] are served by a named
//! connector, picked with `memflow_connector_name` and configured with the
//! repeated `memflow_connector_args` values of a `vmi://` URL:
//!
//! ```text
//! vmi://memflow/?memflow_connector_name=raw&memflow_connector_args=/dumps/guest.raw
//! ```

use crate::driver::registry::DriverFactory;
use crate::memory::error::{DriverError, DriverResult};
use crate::memory::layers::RawImageSession;
use crate::memory::traits::DriverSession;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use vmiurl::{DriverConfig, DriverType};

/// Opens a session from the connector arguments.
pub type ConnectorOpener =
    Box<dyn Fn(&[String]) -> DriverResult<Arc<dyn DriverSession>> + Send + Sync>;

/// Name of the built-in raw image connector.
pub const RAW_CONNECTOR: &str = "raw";

/// Dispatches [`DriverType::Memflow`] configurations to named connectors.
#[derive(Default)]
pub struct ConnectorDriver {
    connectors: BTreeMap<String, ConnectorOpener>,
}

impl ConnectorDriver {
    /// A driver without any connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver with the `raw` connector, which maps the image named by its
    /// first argument.
    pub fn with_builtin() -> Self {
        let mut driver = Self::new();
        driver.add_connector(RAW_CONNECTOR, open_raw);
        driver
    }

    pub fn add_connector<F>(&mut self, name: impl Into<String>, opener: F) -> &mut Self
    where
        F: Fn(&[String]) -> DriverResult<Arc<dyn DriverSession>> + Send + Sync + 'static,
    {
        self.connectors.insert(name.into(), Box::new(opener));
        self
    }

    /// Connector names, sorted.
    pub fn connector_names(&self) -> Vec<String> {
        self.connectors.keys().cloned().collect()
    }
}

impl DriverFactory for ConnectorDriver {
    fn driver_type(&self) -> DriverType {
        DriverType::Memflow
    }

    fn open(&self, config: &DriverConfig) -> DriverResult<Arc<dyn DriverSession>> {
        let (name, args) = config
            .connector()
            .ok_or_else(|| DriverError::MissingParameter("memflow_connector_name".into()))?;

        let opener = self
            .connectors
            .get(name)
            .ok_or_else(|| DriverError::UnknownConnector {
                name: name.to_string(),
                valid: self.connector_names(),
            })?;

        debug!("Opening connector '{}' with {} argument(s)", name, args.len());
        opener(args)
    }
}

fn open_raw(args: &[String]) -> DriverResult<Arc<dyn DriverSession>> {
    let location = args
        .first()
        .ok_or_else(|| DriverError::MissingParameter("memflow_connector_args (image path)".into()))?;
    Ok(Arc::new(RawImageSession::open(location.as_str())?))
}
