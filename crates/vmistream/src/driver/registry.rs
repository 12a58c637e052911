//! Driver factories and the registry that opens sessions through them.

use crate::driver::connector::ConnectorDriver;
use crate::memory::error::{DriverError, DriverResult};
use crate::memory::traits::DriverSession;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use vmiurl::{DriverConfig, DriverType};

/// Opens sessions for one hypervisor backend.
pub trait DriverFactory: Send + Sync {
    fn driver_type(&self) -> DriverType;

    fn open(&self, config: &DriverConfig) -> DriverResult<Arc<dyn DriverSession>>;
}

/// The set of available drivers, at most one per [`DriverType`].
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<DriverType, Box<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the drivers that ship with this crate: the connector
    /// driver, with its built-in `raw` connector.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ConnectorDriver::with_builtin());
        registry
    }

    /// Register a factory, replacing any previous one for the same type.
    pub fn register<F: DriverFactory + 'static>(&mut self, factory: F) -> &mut Self {
        let driver_type = factory.driver_type();
        if self.factories.insert(driver_type, Box::new(factory)).is_some() {
            debug!("Replaced driver factory for {}", driver_type);
        }
        self
    }

    /// Registered types, in detection order.
    pub fn registered(&self) -> Vec<DriverType> {
        DriverType::ALL
            .iter()
            .copied()
            .filter(|t| self.factories.contains_key(t))
            .collect()
    }

    /// Open a session.
    ///
    /// With an explicit type only that driver is tried. Without one, every
    /// registered driver is tried in [`DriverType::ALL`] order and the first
    /// that opens wins.
    pub fn open(
        &self,
        driver_type: Option<DriverType>,
        config: &DriverConfig,
    ) -> DriverResult<Arc<dyn DriverSession>> {
        match driver_type {
            Some(driver_type) => {
                let factory = self
                    .factories
                    .get(&driver_type)
                    .ok_or(DriverError::DriverNotRegistered(driver_type))?;
                let session = factory.open(config)?;
                info!("Opened {} session '{}'", driver_type, session.name());
                Ok(session)
            }
            None => self.detect(config),
        }
    }

    fn detect(&self, config: &DriverConfig) -> DriverResult<Arc<dyn DriverSession>> {
        for driver_type in DriverType::ALL {
            let Some(factory) = self.factories.get(&driver_type) else {
                continue;
            };
            match factory.open(config) {
                Ok(session) => {
                    info!(
                        "Detected {} driver, session '{}'",
                        driver_type,
                        session.name()
                    );
                    return Ok(session);
                }
                Err(e) => debug!("{} driver failed to open: {}", driver_type, e),
            }
        }
        Err(DriverError::NoDriverAvailable)
    }
}
