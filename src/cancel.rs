use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PlotError, Result};

/// Cooperative cancellation flag shared with the Ctrl-C handler
///
/// The batch loop polls it once per feature. With `poll_inner` set the
/// local search polls it on every iteration as well.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    interrupted: Arc<AtomicBool>,
    poll_inner: bool,
}

impl CancelFlag {
    pub fn new(interrupted: Arc<AtomicBool>) -> Self {
        Self {
            interrupted,
            poll_inner: false,
        }
    }

    pub fn with_inner_polling(mut self, poll_inner: bool) -> Self {
        self.poll_inner = poll_inner;
        self
    }

    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PlotError::Cancelled);
        }
        Ok(())
    }

    /// Inner-loop check, a no-op unless inner polling is enabled
    pub fn check_inner(&self) -> Result<()> {
        if self.poll_inner {
            self.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_polling_is_opt_in() {
        let flag = CancelFlag::default();
        flag.cancel();
        assert!(flag.check().is_err());
        assert!(flag.check_inner().is_ok());

        let inner = flag.clone().with_inner_polling(true);
        assert!(matches!(inner.check_inner(), Err(PlotError::Cancelled)));
    }
}
