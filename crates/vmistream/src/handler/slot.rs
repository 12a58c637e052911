//! Single-slot URL handler.

use crate::driver::DriverRegistry;
use crate::handler::HandlerResult;
use crate::memory::padded::PaddedMemoryStream;
use crate::memory::traits::DriverSession;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};
use vmiurl::Grammar;

static GLOBAL: OnceLock<VmiHandler> = OnceLock::new();

/// Opens padded streams for `vmi://` URLs, holding at most one session.
///
/// The first successful [`handle`](Self::handle) opens a session with that
/// URL's configuration. Every later call reuses it, whatever its URL says.
/// The URL is still resolved on each call, so a malformed URL is rejected
/// even once the slot is filled.
///
/// The slot is never emptied; the session lives as long as the handler.
pub struct VmiHandler {
    registry: DriverRegistry,
    grammar: Grammar,
    slot: Mutex<Option<Arc<dyn DriverSession>>>,
}

impl VmiHandler {
    /// URL scheme served by this handler.
    pub const SCHEME: &'static str = vmiurl::SCHEME;

    pub fn new(registry: DriverRegistry) -> Self {
        VmiHandler {
            registry,
            grammar: Grammar::default(),
            slot: Mutex::new(None),
        }
    }

    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// The process-wide handler, backed by the built-in drivers.
    pub fn global() -> &'static VmiHandler {
        GLOBAL.get_or_init(|| VmiHandler::new(DriverRegistry::with_builtin()))
    }

    /// Schemes whose streams must not be cached by the caller, since they
    /// read live memory.
    pub fn non_cached_schemes() -> &'static [&'static str] {
        &[vmiurl::SCHEME]
    }

    /// Resolve `uri` and return a padded stream over the slot's session,
    /// opening it first if the slot is empty.
    pub fn handle(&self, uri: &str) -> HandlerResult<PaddedMemoryStream> {
        let resolution = vmiurl::resolve_with(uri, self.grammar)?;

        let session = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(session) => {
                    debug!("Reusing session '{}' for {}", session.name(), uri);
                    session.clone()
                }
                None => {
                    let session = self
                        .registry
                        .open(resolution.driver_type, &resolution.config)?;
                    info!("Opened session '{}' for {}", session.name(), uri);
                    *slot = Some(session.clone());
                    session
                }
            }
        };

        Ok(PaddedMemoryStream::new(session)?)
    }

    /// The session in the slot, if one has been opened.
    pub fn session(&self) -> Option<Arc<dyn DriverSession>> {
        self.slot.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverFactory;
    use crate::handler::HandlerError;
    use crate::memory::error::{DriverError, DriverResult};
    use crate::memory::mock::MockSession;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vmiurl::{ConfigError, DriverConfig, DriverType};

    /// Opens a mock guest named after the config target.
    struct MockFactory {
        driver_type: DriverType,
        opens: Arc<AtomicUsize>,
        fail: bool,
    }

    impl DriverFactory for MockFactory {
        fn driver_type(&self) -> DriverType {
            self.driver_type
        }

        fn open(&self, config: &DriverConfig) -> DriverResult<Arc<dyn DriverSession>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DriverError::other("no such domain"));
            }
            Ok(Arc::new(
                MockSession::new(0xffff).named(config.target().unwrap_or("anon")),
            ))
        }
    }

    fn handler(fail: bool) -> (Arc<AtomicUsize>, VmiHandler) {
        let opens = Arc::new(AtomicUsize::new(0));
        let mut registry = DriverRegistry::new();
        registry.register(MockFactory {
            driver_type: DriverType::KVM,
            opens: opens.clone(),
            fail,
        });
        (opens, VmiHandler::new(registry))
    }

    #[test]
    fn test_first_session_wins() {
        let (opens, handler) = handler(false);
        let first = handler.handle("vmi://KVM/first").unwrap();
        let second = handler.handle("vmi://KVM/second").unwrap();

        assert_eq!(first.session().name(), "first");
        assert_eq!(second.session().name(), "first");
        assert!(Arc::ptr_eq(first.session(), second.session()));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_streams_have_independent_cursors() {
        let (_, handler) = handler(false);
        let mut a = handler.handle("vmi://KVM/win10").unwrap();
        let b = handler.handle("vmi://KVM/win10").unwrap();
        a.read(0x10);
        assert_eq!(a.tell(), 0x10);
        assert_eq!(b.tell(), 0);
    }

    #[test]
    fn test_invalid_url_rejected_after_open() {
        let (_, handler) = handler(false);
        handler.handle("vmi://KVM/win10").unwrap();
        assert!(matches!(
            handler.handle("file:///tmp/x"),
            Err(HandlerError::Config(ConfigError::SchemeMismatch { .. }))
        ));
    }

    #[test]
    fn test_failed_open_leaves_slot_empty() {
        let (opens, handler) = handler(true);
        assert!(matches!(
            handler.handle("vmi://KVM/win10"),
            Err(HandlerError::Driver(DriverError::Other(_)))
        ));
        assert!(!handler.is_open());
        assert!(handler.handle("vmi://KVM/win10").is_err());
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregistered_driver() {
        let (_, handler) = handler(false);
        assert!(matches!(
            handler.handle("vmi://Xen/win10"),
            Err(HandlerError::Driver(DriverError::DriverNotRegistered(
                DriverType::Xen
            )))
        ));
    }

    #[test]
    fn test_simple_grammar() {
        let (_, handler) = handler(false);
        let handler = handler.with_grammar(Grammar::Simple);
        assert!(matches!(
            handler.handle("vmi://KVM/"),
            Err(HandlerError::Config(ConfigError::EmptyTarget))
        ));
        let stream = handler
            .handle("vmi://KVM/win10?kvmi_unix_socket=/tmp/introspector")
            .unwrap();
        assert_eq!(stream.session().name(), "win10");
    }

    #[test]
    fn test_session_accessor() {
        let (_, handler) = handler(false);
        assert!(handler.session().is_none());
        handler.handle("vmi://KVM/win10").unwrap();
        assert_eq!(handler.session().unwrap().name(), "win10");
    }

    #[test]
    fn test_scheme_constants() {
        assert_eq!(VmiHandler::SCHEME, "vmi");
        assert_eq!(VmiHandler::non_cached_schemes(), &["vmi"]);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(VmiHandler::global(), VmiHandler::global()));
    }
}
