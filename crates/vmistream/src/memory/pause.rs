//! Scoped pause/resume of a guest.
//!
//! Reads taken while the guest is paused form a consistent snapshot. The
//! guard resumes the guest on every exit path, including early returns and
//! panics.

use crate::memory::error::{DriverError, DriverResult};
use crate::memory::traits::DriverSession;
use tracing::{debug, warn};

/// Keeps a guest paused for as long as it is alive.
pub struct PauseGuard<'a> {
    session: &'a dyn DriverSession,
    resumed: bool,
}

impl<'a> PauseGuard<'a> {
    /// Pause the guest. Nothing needs undoing if this fails.
    pub fn new(session: &'a dyn DriverSession) -> DriverResult<Self> {
        session.pause()?;
        debug!("Paused '{}'", session.name());
        Ok(PauseGuard {
            session,
            resumed: false,
        })
    }

    /// Resume now and report the outcome. Dropping the guard resumes too,
    /// but can only log a failure.
    pub fn resume(mut self) -> DriverResult<()> {
        self.resumed = true;
        self.session.resume()
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if self.resumed {
            return;
        }
        if let Err(e) = self.session.resume() {
            warn!("Failed to resume '{}': {}", self.session.name(), e);
        }
    }
}

/// Run `body` with the guest paused.
///
/// Resume is always attempted. If both the body and the resume fail, the
/// body's error is returned.
pub fn with_paused<T, E, F>(session: &dyn DriverSession, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<DriverError>,
{
    let guard = PauseGuard::new(session)?;
    let result = body();
    let resumed = guard.resume();
    let value = result?;
    resumed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::error::{StreamError, StreamResult};
    use crate::memory::mock::MockSession;
    use crate::memory::stream::MemoryStream;
    use std::io::SeekFrom;
    use std::sync::Arc;

    #[test]
    fn test_guard_resumes_on_drop() {
        let mock = MockSession::new(0xfff);
        {
            let _guard = PauseGuard::new(&mock).unwrap();
            assert_eq!(mock.pause_count(), 1);
            assert_eq!(mock.resume_count(), 0);
        }
        assert_eq!(mock.resume_count(), 1);
    }

    #[test]
    fn test_guard_explicit_resume_once() {
        let mock = MockSession::new(0xfff);
        let guard = PauseGuard::new(&mock).unwrap();
        guard.resume().unwrap();
        assert_eq!(mock.resume_count(), 1);
    }

    #[test]
    fn test_failed_pause_does_not_resume() {
        let mut mock = MockSession::new(0xfff);
        mock.fail_pause = true;
        assert!(PauseGuard::new(&mock).is_err());
        assert_eq!(mock.resume_count(), 0);
    }

    #[test]
    fn test_with_paused_resumes_after_read_failure() {
        let mock = Arc::new(MockSession::new(0xffff).with_bad_page(0));
        let stream = MemoryStream::new(mock.clone()).unwrap();

        let result: StreamResult<Vec<u8>> = with_paused(&*mock, || stream.read(16));
        assert!(matches!(result, Err(StreamError::Driver(_))));
        assert_eq!(mock.pause_count(), 1);
        assert_eq!(mock.resume_count(), 1);
    }

    #[test]
    fn test_with_paused_returns_body_value() {
        let mock = Arc::new(MockSession::new(0xffff));
        let mut stream = MemoryStream::new(mock.clone()).unwrap();

        let data: StreamResult<Vec<u8>> = with_paused(&*mock, || {
            stream.seek(SeekFrom::Start(0x20))?;
            stream.read(4)
        });
        assert_eq!(data.unwrap()[0], MockSession::byte_at(0x20));
        assert_eq!(mock.resume_count(), 1);
    }

    #[test]
    fn test_with_paused_reports_resume_failure() {
        let mut mock = MockSession::new(0xfff);
        mock.fail_resume = true;
        let result: DriverResult<u32> = with_paused(&mock, || Ok(7));
        assert!(matches!(result, Err(DriverError::Other(_))));
    }

    #[test]
    fn test_with_paused_prefers_body_error() {
        let mut mock = MockSession::new(0xfff);
        mock.fail_resume = true;
        let result: DriverResult<u32> =
            with_paused(&mock, || Err(DriverError::MissingParameter("body".into())));
        assert!(matches!(result, Err(DriverError::MissingParameter(_))));
        assert_eq!(mock.resume_count(), 1);
    }

    #[test]
    fn test_guard_resumes_on_panic() {
        let mock = MockSession::new(0xfff);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = PauseGuard::new(&mock).unwrap();
            panic!("boom");
        }));
        assert!(outcome.is_err());
        assert_eq!(mock.resume_count(), 1);
    }
}
