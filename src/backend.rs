//! The operating-system seam.
//!
//! Everything the core needs from the OS goes through [`Backend`]: opening a
//! device resource, creating a wait event, issuing a control call, waiting
//! on a set of events and closing handles. [`Win32Backend`] talks to the real
//! driver; [`mock::MockBackend`] stands in for it in tests.

use std::io;

pub mod mock;
#[cfg(windows)]
pub mod win32;

#[cfg(windows)]
pub use win32::Win32Backend;

/// Opaque OS handle value. `RawHandle::NULL` marks a closed or never-opened slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(pub isize);

impl RawHandle {
    pub const NULL: Self = Self(0);
    pub const INVALID: Self = Self(-1);

    pub fn is_valid(self) -> bool {
        self != Self::NULL && self != Self::INVALID
    }
}

/// Name of the device resource for slot `index`.
pub fn device_path(index: usize) -> String {
    format!(r"\\.\interception{:02}", index)
}

pub trait Backend {
    /// Opens the device resource for `index` for shared read/write access.
    /// Fails when the resource does not exist.
    fn open_device(&self, index: usize) -> io::Result<RawHandle>;

    /// Creates an unsignaled, manual-reset event.
    fn create_event(&self) -> io::Result<RawHandle>;

    /// Issues one control call. `output` is filled from the start; the
    /// returned value is the number of bytes the driver wrote into it.
    fn device_io_control(
        &self,
        handle: RawHandle,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> io::Result<u32>;

    /// Blocks until any of `events` is signaled and returns its position.
    /// `None` for `timeout_ms` waits forever; `Ok(None)` means the timeout
    /// elapsed.
    fn wait_any(&self, events: &[RawHandle], timeout_ms: Option<u32>) -> io::Result<Option<usize>>;

    fn close_handle(&self, handle: RawHandle);
}
