//! Per-thread error slot for failures that are reported as empty results.
//!
//! Recoverable failures (a window whose inference failed, a decode called
//! before initialization) surface to callers as empty results rather than
//! errors. The message of the most recent such failure on the current thread
//! is retrievable here for diagnostics.

use std::cell::RefCell;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Returns the most recent recoverable-failure message recorded on this
/// thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clears the per-thread error slot.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    log::error!("{}", message);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_roundtrip() {
        clear_last_error();
        assert_eq!(last_error(), None);

        set_last_error("window 3: inference failed");
        assert_eq!(last_error().as_deref(), Some("window 3: inference failed"));

        clear_last_error();
        assert_eq!(last_error(), None);
    }
}
