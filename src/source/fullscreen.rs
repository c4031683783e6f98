//! Fullscreen capability with a vendor fallback chain.

use crate::source::platform::{AcquireError, FullscreenBackend};
use tracing::{debug, warn};

/// Fullscreen source trying each backend in order until one succeeds.
pub struct FullscreenSource {
    backends: Vec<Box<dyn FullscreenBackend>>,
    active_backend: Option<usize>,
}

impl FullscreenSource {
    /// Create a source from an ordered strategy list (most standard first).
    pub fn new(backends: Vec<Box<dyn FullscreenBackend>>) -> Self {
        Self {
            backends,
            active_backend: None,
        }
    }

    /// Enter fullscreen using the first supported backend that accepts.
    pub fn acquire(&mut self) -> Result<&'static str, AcquireError> {
        let mut last_error = None;

        for (index, backend) in self.backends.iter_mut().enumerate() {
            if !backend.is_supported() {
                debug!(backend = backend.name(), "fullscreen backend not supported");
                continue;
            }
            match backend.request() {
                Ok(()) => {
                    self.active_backend = Some(index);
                    return Ok(backend.name());
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "fullscreen request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AcquireError::Unsupported("no fullscreen API available".into())))
    }

    /// Leave fullscreen through the backend that entered it.
    pub fn release(&mut self) {
        if let Some(index) = self.active_backend.take() {
            if let Some(backend) = self.backends.get_mut(index) {
                if let Err(e) = backend.exit() {
                    warn!(backend = backend.name(), error = %e, "failed to exit fullscreen");
                }
            }
        }
    }

    /// Whether any backend reports an active fullscreen element.
    pub fn is_fullscreen(&self) -> bool {
        self.backends.iter().any(|b| b.is_active())
    }

    pub fn active_backend(&self) -> Option<&'static str> {
        self.active_backend
            .and_then(|i| self.backends.get(i))
            .map(|b| b.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend {
        name: &'static str,
        supported: bool,
        accept: bool,
        active: bool,
    }

    impl FullscreenBackend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_supported(&self) -> bool {
            self.supported
        }
        fn request(&mut self) -> Result<(), AcquireError> {
            if self.accept {
                self.active = true;
                Ok(())
            } else {
                Err(AcquireError::PermissionDenied(self.name.into()))
            }
        }
        fn exit(&mut self) -> Result<(), AcquireError> {
            self.active = false;
            Ok(())
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn backend(name: &'static str, supported: bool, accept: bool) -> Box<dyn FullscreenBackend> {
        Box::new(FakeBackend {
            name,
            supported,
            accept,
            active: false,
        })
    }

    #[test]
    fn test_falls_through_to_prefixed_backend() {
        let mut source = FullscreenSource::new(vec![
            backend("standard", false, true),
            backend("moz", true, false),
            backend("webkit", true, true),
        ]);

        assert_eq!(source.acquire(), Ok("webkit"));
        assert!(source.is_fullscreen());
        assert_eq!(source.active_backend(), Some("webkit"));

        source.release();
        assert!(!source.is_fullscreen());
        assert_eq!(source.active_backend(), None);
    }

    #[test]
    fn test_no_supported_backend() {
        let mut source = FullscreenSource::new(vec![backend("ms", false, true)]);
        assert!(matches!(
            source.acquire(),
            Err(AcquireError::Unsupported(_))
        ));
    }

    #[test]
    fn test_all_backends_refuse() {
        let mut source = FullscreenSource::new(vec![backend("standard", true, false)]);
        assert!(matches!(
            source.acquire(),
            Err(AcquireError::PermissionDenied(_))
        ));
    }
}
