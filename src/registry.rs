//! The full set of twenty driver slots.
//!
//! [`DeviceRegistry`] opens every slot up front and owns them until it is
//! destroyed. Next to the channels it keeps a flat array of their wait events,
//! index-aligned with the channels, which is what the multiplexer waits on.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{Backend, RawHandle};
use crate::device::{self, role_of, DeviceChannel, DeviceKind, DEVICE_COUNT};
use crate::error::{InterceptionError, Result};
use crate::filter::apply_filter;
use crate::flags::FilterMask;
use crate::multiplexer;
use crate::stroke::{KeyStroke, MouseStroke, Role, Stroke};

#[cfg(windows)]
use crate::backend::Win32Backend;

const DEFAULT_KEYBOARD: usize = 1;
const DEFAULT_MOUSE: usize = 11;

/// Owns all twenty device channels and their wait events.
///
/// # Example
///
/// ```no_run
/// # #[cfg(windows)]
/// # fn main() -> interception_mux::Result<()> {
/// use interception_mux::{is_keyboard, DeviceRegistry, KeyFilter};
///
/// let registry = DeviceRegistry::open()?;
/// registry.set_filter(is_keyboard, KeyFilter::KEY_DOWN | KeyFilter::KEY_UP)?;
///
/// loop {
///     let Some(device) = registry.wait(-1) else { continue };
///     if let Ok(Some(stroke)) = registry.receive(device) {
///         registry.send(device, &stroke)?;
///     }
/// }
/// # }
/// # #[cfg(not(windows))]
/// # fn main() {}
/// ```
#[derive(Debug)]
pub struct DeviceRegistry<B: Backend> {
    backend: Arc<B>,
    channels: Vec<DeviceChannel<B>>,
    events: [RawHandle; DEVICE_COUNT],
    keyboard: usize,
    mouse: usize,
}

#[cfg(windows)]
impl DeviceRegistry<Win32Backend> {
    /// Opens all slots of the installed driver.
    pub fn open() -> Result<Self> {
        Self::open_with(Arc::new(Win32Backend::new()))
    }
}

impl<B: Backend> DeviceRegistry<B> {
    /// Opens slots `0..20` in order, binding each one's event right after
    /// opening it. If any slot fails, every slot opened so far is closed
    /// before the error is returned.
    pub fn open_with(backend: Arc<B>) -> Result<Self> {
        let mut channels: Vec<DeviceChannel<B>> = Vec::with_capacity(DEVICE_COUNT);
        let mut events = [RawHandle::NULL; DEVICE_COUNT];

        for index in 0..DEVICE_COUNT {
            match open_channel(&backend, index) {
                Ok(channel) => {
                    events[index] = channel.event();
                    channels.push(channel);
                }
                Err(err) => {
                    warn!(
                        index,
                        error = %err,
                        opened = channels.len(),
                        "device open failed, rolling back"
                    );
                    for channel in channels.iter_mut() {
                        channel.close();
                    }
                    return Err(surface_missing_driver(err));
                }
            }
        }

        info!(devices = DEVICE_COUNT, "opened interception devices");
        Ok(Self {
            backend,
            channels,
            events,
            keyboard: DEFAULT_KEYBOARD,
            mouse: DEFAULT_MOUSE,
        })
    }

    pub fn classify(index: isize) -> DeviceKind {
        device::classify(index)
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn channels(&self) -> &[DeviceChannel<B>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Result<&DeviceChannel<B>> {
        self.channels
            .get(index)
            .ok_or(InterceptionError::InvalidDeviceIndex(index as isize))
    }

    /// Wait events, `events()[i]` belonging to `channels()[i]`.
    pub fn events(&self) -> &[RawHandle; DEVICE_COUNT] {
        &self.events
    }

    /// Blocks until a device has input and returns its index. See
    /// [`multiplexer::wait_any`] for timeout semantics.
    ///
    /// Not for concurrent use: callers sharing a registry across threads
    /// must serialize access themselves.
    pub fn wait(&self, timeout_millis: i32) -> Option<usize> {
        multiplexer::wait_any(self.backend.as_ref(), &self.events, timeout_millis)
    }

    pub fn receive(&self, index: usize) -> Result<Option<Stroke>> {
        self.channel(index)?.receive()
    }

    pub fn send(&self, index: usize, stroke: &Stroke) -> Result<()> {
        self.channel(index)?.send(stroke)
    }

    /// Applies `mask` to every device whose index satisfies `predicate`.
    /// Returns the number of devices changed; see [`apply_filter`] for the
    /// partial-failure behavior.
    pub fn set_filter<P>(&self, predicate: P, mask: impl Into<FilterMask>) -> Result<usize>
    where
        P: Fn(usize) -> bool,
    {
        apply_filter(&self.channels, predicate, mask.into())
    }

    pub fn filter(&self, index: usize) -> Result<FilterMask> {
        self.channel(index)?.filter()
    }

    pub fn precedence(&self, index: usize) -> Result<i32> {
        self.channel(index)?.precedence()
    }

    pub fn set_precedence(&self, index: usize, precedence: i32) -> Result<()> {
        self.channel(index)?.set_precedence(precedence)
    }

    pub fn hardware_id(&self, index: usize) -> Result<Option<String>> {
        Ok(self.channel(index)?.hardware_id())
    }

    /// Device used by [`DeviceRegistry::send_key`].
    pub fn keyboard(&self) -> usize {
        self.keyboard
    }

    /// Device used by [`DeviceRegistry::send_mouse`].
    pub fn mouse(&self) -> usize {
        self.mouse
    }

    pub fn set_default_keyboard(&mut self, index: usize) -> Result<()> {
        self.keyboard = expect_role(index, Role::Keyboard)?;
        debug!(index, "default keyboard changed");
        Ok(())
    }

    pub fn set_default_mouse(&mut self, index: usize) -> Result<()> {
        self.mouse = expect_role(index, Role::Mouse)?;
        debug!(index, "default mouse changed");
        Ok(())
    }

    pub fn send_key(&self, stroke: KeyStroke) -> Result<()> {
        self.send(self.keyboard, &Stroke::Key(stroke))
    }

    pub fn send_mouse(&self, stroke: MouseStroke) -> Result<()> {
        self.send(self.mouse, &Stroke::Mouse(stroke))
    }

    /// Closes every channel. Safe on an already destroyed registry.
    pub fn destroy(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.close();
        }
        self.events = [RawHandle::NULL; DEVICE_COUNT];
    }
}

impl<B: Backend> Drop for DeviceRegistry<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn open_channel<B: Backend>(backend: &Arc<B>, index: usize) -> Result<DeviceChannel<B>> {
    let mut channel = DeviceChannel::open(Arc::clone(backend), index)?;
    let event = backend
        .create_event()
        .map_err(|e| InterceptionError::sync_binding_failed(index, e.to_string()))?;
    channel.bind_event(event)?;
    Ok(channel)
}

fn surface_missing_driver(err: InterceptionError) -> InterceptionError {
    match err {
        InterceptionError::HandleCreationFailed { source, .. }
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            InterceptionError::DriverNotFound(source)
        }
        other => other,
    }
}

fn expect_role(index: usize, expected: Role) -> Result<usize> {
    let found = role_of(index)?;
    if found != expected {
        return Err(InterceptionError::role_mismatch(index, expected, found));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    #[test]
    fn test_events_are_index_aligned() {
        let registry = DeviceRegistry::open_with(Arc::new(MockBackend::new())).unwrap();
        for (i, channel) in registry.channels().iter().enumerate() {
            assert_eq!(channel.index(), i);
            assert_eq!(registry.events()[i], channel.event());
            assert!(registry.events()[i].is_valid());
        }
    }

    #[test]
    fn test_roles_follow_index_ranges() {
        let registry = DeviceRegistry::open_with(Arc::new(MockBackend::new())).unwrap();
        for channel in registry.channels() {
            let expected = if channel.index() < 10 {
                Role::Keyboard
            } else {
                Role::Mouse
            };
            assert_eq!(channel.role(), expected);
        }
    }

    #[test]
    fn test_default_device_selection() {
        let mut registry = DeviceRegistry::open_with(Arc::new(MockBackend::new())).unwrap();
        assert_eq!(registry.keyboard(), 1);
        assert_eq!(registry.mouse(), 11);

        registry.set_default_keyboard(4).unwrap();
        assert_eq!(registry.keyboard(), 4);

        assert!(matches!(
            registry.set_default_keyboard(12),
            Err(InterceptionError::RoleMismatch {
                expected: Role::Keyboard,
                found: Role::Mouse,
                ..
            })
        ));
        assert!(matches!(
            registry.set_default_mouse(20),
            Err(InterceptionError::InvalidDeviceIndex(20))
        ));
        assert_eq!(registry.mouse(), 11);
    }

    #[test]
    fn test_missing_driver_is_surfaced() {
        let err = DeviceRegistry::open_with(Arc::new(MockBackend::new().fail_open_at(0))).unwrap_err();
        assert!(matches!(err, InterceptionError::DriverNotFound(_)));

        let err = DeviceRegistry::open_with(Arc::new(
            MockBackend::new().fail_open_with(0, std::io::ErrorKind::PermissionDenied),
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            InterceptionError::HandleCreationFailed { index: 0, .. }
        ));
    }
}
