//! User interrupt handling
//!
//! SIGINT sets a process-wide flag instead of killing the tool, so the
//! pipeline can observe it between states and still run its cleanup.

use nix::sys::signal::{self, SigAction, SigHandler, SaFlags, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT to the interrupt flag
pub fn install_sigint_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only performs an atomic store, which is async-signal-safe.
    unsafe { signal::sigaction(Signal::SIGINT, &action) }.map(|_| ())
}

/// Cheap, cloneable view of the cancellation state
///
/// A token is cancelled when [`CancelToken::cancel`] was called on any of its
/// clones, or, for tokens built with [`CancelToken::with_sigint`], when the
/// process received SIGINT.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    local: Arc<AtomicBool>,
    observe_sigint: bool,
}

impl CancelToken {
    /// Token that is only cancelled programmatically
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also observes the SIGINT flag
    pub fn with_sigint() -> Self {
        Self {
            local: Arc::default(),
            observe_sigint: true,
        }
    }

    /// Request cancellation programmatically
    pub fn cancel(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.local.load(Ordering::SeqCst)
            || (self.observe_sigint && INTERRUPTED.load(Ordering::SeqCst))
    }

    /// `Err(Cancelled)` once cancellation has been requested
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_local_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(crate::Error::Cancelled)));
    }

    #[test]
    #[serial]
    fn test_sigint_sets_flag() {
        install_sigint_handler().unwrap();
        nix::sys::signal::raise(Signal::SIGINT).unwrap();
        let token = CancelToken::with_sigint();
        assert!(token.is_cancelled());
        assert!(!CancelToken::new().is_cancelled());
        INTERRUPTED.store(false, Ordering::SeqCst);
        assert!(!token.is_cancelled());
    }
}
