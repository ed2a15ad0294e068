//! Blocking wait across every device's event.

use tracing::{trace, warn};

use crate::backend::{Backend, RawHandle};

/// Waits forever.
pub const INFINITE: i32 = -1;

/// Blocks until one of `events` signals or `timeout_millis` elapses.
///
/// A negative timeout waits forever. Returns the position of the signaled
/// event. Timeout and wait failure both come back as `None`; either way the
/// caller just waits again. Among several ready events the OS picks one.
pub fn wait_any<B: Backend>(backend: &B, events: &[RawHandle], timeout_millis: i32) -> Option<usize> {
    let timeout = u32::try_from(timeout_millis).ok();

    match backend.wait_any(events, timeout) {
        Ok(Some(index)) => {
            trace!(index, "device signaled");
            Some(index)
        }
        Ok(None) => {
            trace!(timeout_millis, "wait timed out");
            None
        }
        Err(e) => {
            warn!(error = %e, "wait on device events failed");
            None
        }
    }
}
