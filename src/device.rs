//! A single driver slot: its handle, its wait event and the control calls
//! made against it.
//!
//! Slots `0..10` are keyboards and `10..20` are mice. A [`DeviceChannel`] is
//! bound to its role when it is opened and only ever reads or writes frames
//! of that role.

use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::{Backend, RawHandle};
use crate::error::{InterceptionError, Result};
use crate::flags::FilterMask;
use crate::stroke::{Role, Stroke};

pub const MAX_KEYBOARD: usize = 10;
pub const MAX_MOUSE: usize = 10;
pub const DEVICE_COUNT: usize = MAX_KEYBOARD + MAX_MOUSE;

/// Largest hardware id the driver will return, in bytes.
pub const HARDWARE_ID_CAPACITY: usize = 500;

/// Control codes understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ControlCode {
    SetPrecedence = 0x0022_2004,
    GetPrecedence = 0x0022_2008,
    SetFilter = 0x0022_2010,
    GetFilter = 0x0022_2020,
    SetEvent = 0x0022_2040,
    Write = 0x0022_2080,
    Read = 0x0022_2100,
    GetHardwareId = 0x0022_2200,
}

impl ControlCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let op = match code {
            0x0022_2004 => Self::SetPrecedence,
            0x0022_2008 => Self::GetPrecedence,
            0x0022_2010 => Self::SetFilter,
            0x0022_2020 => Self::GetFilter,
            0x0022_2040 => Self::SetEvent,
            0x0022_2080 => Self::Write,
            0x0022_2100 => Self::Read,
            0x0022_2200 => Self::GetHardwareId,
            _ => return None,
        };
        Some(op)
    }
}

/// What a slot index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    Mouse,
    Invalid,
}

pub fn classify(index: isize) -> DeviceKind {
    match index {
        i if (0..MAX_KEYBOARD as isize).contains(&i) => DeviceKind::Keyboard,
        i if (MAX_KEYBOARD as isize..DEVICE_COUNT as isize).contains(&i) => DeviceKind::Mouse,
        _ => DeviceKind::Invalid,
    }
}

pub fn is_keyboard(index: usize) -> bool {
    index < MAX_KEYBOARD
}

pub fn is_mouse(index: usize) -> bool {
    (MAX_KEYBOARD..DEVICE_COUNT).contains(&index)
}

pub fn is_invalid(index: isize) -> bool {
    classify(index) == DeviceKind::Invalid
}

/// Role of a valid slot index.
pub fn role_of(index: usize) -> Result<Role> {
    match classify(index as isize) {
        DeviceKind::Keyboard => Ok(Role::Keyboard),
        DeviceKind::Mouse => Ok(Role::Mouse),
        DeviceKind::Invalid => Err(InterceptionError::InvalidDeviceIndex(index as isize)),
    }
}

/// Outcome of one control call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIoResult {
    pub succeeded: bool,
    pub bytes_returned: u32,
    pub output: Option<Vec<u8>>,
}

impl DeviceIoResult {
    fn failed() -> Self {
        Self::default()
    }

    /// The part of the output buffer the driver actually wrote.
    pub fn data(&self) -> &[u8] {
        match &self.output {
            Some(buf) => &buf[..(self.bytes_returned as usize).min(buf.len())],
            None => &[],
        }
    }
}

/// Owned handle and wait event for one driver slot.
#[derive(Debug)]
pub struct DeviceChannel<B: Backend> {
    index: usize,
    role: Role,
    backend: Arc<B>,
    handle: RawHandle,
    event: RawHandle,
}

impl<B: Backend> DeviceChannel<B> {
    /// Opens the device resource for `index`. Nothing is left open on failure.
    pub fn open(backend: Arc<B>, index: usize) -> Result<Self> {
        let role = role_of(index)?;
        let handle = backend
            .open_device(index)
            .map_err(|e| InterceptionError::handle_creation_failed(index, e))?;
        debug!(index, %role, handle = handle.0, "opened device");

        Ok(Self {
            index,
            role,
            backend,
            handle,
            event: RawHandle::NULL,
        })
    }

    /// Hands `event` to the driver so it is signaled when this device has
    /// input. The channel owns the event from here on, even if binding fails.
    /// A channel binds once; a second event is closed and rejected.
    pub fn bind_event(&mut self, event: RawHandle) -> Result<()> {
        if self.event.is_valid() {
            if event.is_valid() {
                self.backend.close_handle(event);
            }
            return Err(InterceptionError::sync_binding_failed(
                self.index,
                "wait event already bound",
            ));
        }
        self.event = event;

        // The driver expects the handle zero-padded to two pointer widths.
        let width = mem::size_of::<isize>();
        let mut input = vec![0u8; width * 2];
        input[..width].copy_from_slice(&event.0.to_le_bytes());

        let result = self.control(ControlCode::SetEvent, Some(&input), None);
        if !result.succeeded {
            return Err(InterceptionError::sync_binding_failed(
                self.index,
                "driver rejected the wait event",
            ));
        }
        debug!(index = self.index, event = event.0, "bound wait event");
        Ok(())
    }

    /// Issues one control call against this device's handle.
    ///
    /// `output_len` sizes the output buffer; `None` means the call has no
    /// output. A closed channel reports failure without reaching the backend.
    pub fn control(
        &self,
        code: ControlCode,
        input: Option<&[u8]>,
        output_len: Option<usize>,
    ) -> DeviceIoResult {
        if !self.handle.is_valid() {
            return DeviceIoResult::failed();
        }

        let mut output = vec![0u8; output_len.unwrap_or(0)];
        match self.backend.device_io_control(
            self.handle,
            code.code(),
            input.unwrap_or(&[]),
            &mut output,
        ) {
            Ok(bytes_returned) => DeviceIoResult {
                succeeded: true,
                bytes_returned,
                output: output_len.map(|_| output),
            },
            Err(e) => {
                debug!(index = self.index, ?code, error = %e, "control call failed");
                DeviceIoResult::failed()
            }
        }
    }

    fn checked(
        &self,
        code: ControlCode,
        input: Option<&[u8]>,
        output_len: Option<usize>,
    ) -> Result<DeviceIoResult> {
        let result = self.control(code, input, output_len);
        if result.succeeded {
            Ok(result)
        } else {
            Err(InterceptionError::control_failed(self.index, code))
        }
    }

    pub fn filter(&self) -> Result<FilterMask> {
        let result = self.checked(ControlCode::GetFilter, None, Some(2))?;
        match result.data() {
            [lo, hi, ..] => Ok(FilterMask(u16::from_le_bytes([*lo, *hi]))),
            _ => Err(InterceptionError::control_failed(
                self.index,
                ControlCode::GetFilter,
            )),
        }
    }

    pub fn set_filter(&self, mask: impl Into<FilterMask>) -> Result<()> {
        let mask = mask.into();
        self.checked(ControlCode::SetFilter, Some(&mask.bits().to_le_bytes()), None)?;
        debug!(index = self.index, filter = mask.bits(), "set filter");
        Ok(())
    }

    pub fn precedence(&self) -> Result<i32> {
        let result = self.checked(ControlCode::GetPrecedence, None, Some(4))?;
        match result.data() {
            [a, b, c, d, ..] => Ok(i32::from_le_bytes([*a, *b, *c, *d])),
            _ => Err(InterceptionError::control_failed(
                self.index,
                ControlCode::GetPrecedence,
            )),
        }
    }

    pub fn set_precedence(&self, precedence: i32) -> Result<()> {
        self.checked(
            ControlCode::SetPrecedence,
            Some(&precedence.to_le_bytes()),
            None,
        )?;
        debug!(index = self.index, precedence, "set precedence");
        Ok(())
    }

    /// Hardware id reported by the driver, or `None` if it has none.
    pub fn hardware_id(&self) -> Option<String> {
        let result = self.control(ControlCode::GetHardwareId, None, Some(HARDWARE_ID_CAPACITY));
        if !result.succeeded {
            return None;
        }
        decode_hardware_id(result.data())
    }

    /// Reads one frame. `Ok(None)` when the driver had nothing to hand out.
    pub fn receive(&self) -> Result<Option<Stroke>> {
        let result = self.checked(ControlCode::Read, None, Some(self.role.frame_size()))?;
        if result.bytes_returned == 0 {
            return Ok(None);
        }

        let stroke = Stroke::decode(result.data(), self.role)?;
        trace!(index = self.index, ?stroke, "received stroke");
        Ok(Some(stroke))
    }

    /// Writes one frame. Strokes of the other role are rejected before any I/O.
    pub fn send(&self, stroke: &Stroke) -> Result<()> {
        if stroke.role() != self.role {
            return Err(InterceptionError::role_mismatch(
                self.index,
                self.role,
                stroke.role(),
            ));
        }

        self.checked(ControlCode::Write, Some(&stroke.encode()), None)?;
        trace!(index = self.index, ?stroke, "sent stroke");
        Ok(())
    }

    /// Releases the handle and the event. Safe to call more than once.
    pub fn close(&mut self) {
        let handle = mem::replace(&mut self.handle, RawHandle::NULL);
        let event = mem::replace(&mut self.event, RawHandle::NULL);

        if handle.is_valid() {
            self.backend.close_handle(handle);
        }
        if event.is_valid() {
            self.backend.close_handle(event);
        }
        if handle.is_valid() || event.is_valid() {
            debug!(index = self.index, "closed device");
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn event(&self) -> RawHandle {
        self.event
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_valid()
    }
}

impl<B: Backend> Drop for DeviceChannel<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode_hardware_id(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let id = String::from_utf16(&units).ok()?;
    let id = id.trim_end_matches('\0');
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::flags::{KeyFilter, MouseFilter};
    use crate::stroke::{KeyStroke, MouseStroke};

    fn bound_channel(backend: &Arc<MockBackend>, index: usize) -> DeviceChannel<MockBackend> {
        let mut channel = DeviceChannel::open(Arc::clone(backend), index).unwrap();
        let event = backend.create_event().unwrap();
        channel.bind_event(event).unwrap();
        channel
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(-1), DeviceKind::Invalid);
        assert_eq!(classify(0), DeviceKind::Keyboard);
        assert_eq!(classify(9), DeviceKind::Keyboard);
        assert_eq!(classify(10), DeviceKind::Mouse);
        assert_eq!(classify(19), DeviceKind::Mouse);
        assert_eq!(classify(20), DeviceKind::Invalid);

        assert!(is_keyboard(9));
        assert!(!is_keyboard(10));
        assert!(is_mouse(10));
        assert!(!is_mouse(20));
        assert!(is_invalid(-1));
        assert!(is_invalid(20));
    }

    #[test]
    fn test_control_code_lookup() {
        for code in [
            ControlCode::SetPrecedence,
            ControlCode::GetPrecedence,
            ControlCode::SetFilter,
            ControlCode::GetFilter,
            ControlCode::SetEvent,
            ControlCode::Write,
            ControlCode::Read,
            ControlCode::GetHardwareId,
        ] {
            assert_eq!(ControlCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ControlCode::from_code(0x0022_2000), None);
    }

    #[test]
    fn test_open_rejects_invalid_index() {
        let backend = Arc::new(MockBackend::new());
        let err = DeviceChannel::open(Arc::clone(&backend), 20).unwrap_err();
        assert!(matches!(err, InterceptionError::InvalidDeviceIndex(20)));
        assert_eq!(backend.opened_devices(), 0);
    }

    #[test]
    fn test_filter_and_precedence() {
        let backend = Arc::new(MockBackend::new());
        let keyboard = bound_channel(&backend, 2);

        keyboard.set_filter(KeyFilter::KEY_DOWN | KeyFilter::KEY_UP).unwrap();
        assert_eq!(keyboard.filter().unwrap().bits(), 0x0003);
        assert_eq!(backend.filter(2), 0x0003);

        keyboard.set_precedence(-7).unwrap();
        assert_eq!(keyboard.precedence().unwrap(), -7);

        let mouse = bound_channel(&backend, 12);
        mouse.set_filter(MouseFilter::MOVE).unwrap();
        assert_eq!(mouse.filter().unwrap().as_mouse_filter(), MouseFilter::MOVE);
    }

    #[test]
    fn test_hardware_id() {
        let backend = Arc::new(MockBackend::new());
        let channel = bound_channel(&backend, 0);
        assert_eq!(channel.hardware_id(), None);

        backend.set_hardware_id(0, r"HID\VID_046D&PID_C31C");
        assert_eq!(
            channel.hardware_id().as_deref(),
            Some(r"HID\VID_046D&PID_C31C")
        );
    }

    #[test]
    fn test_hardware_id_decoding() {
        assert_eq!(decode_hardware_id(&[]), None);
        assert_eq!(decode_hardware_id(&[0, 0, 0, 0]), None);
        assert_eq!(
            decode_hardware_id(&[b'A', 0, b'B', 0, 0, 0]).as_deref(),
            Some("AB")
        );
    }

    #[test]
    fn test_malformed_hardware_id_is_none() {
        // Unpaired high surrogate followed by a NUL terminator.
        assert_eq!(decode_hardware_id(&[0x00, 0xD8, 0, 0]), None);
        assert_eq!(decode_hardware_id(&[b'A', 0, 0x00, 0xDC]), None);

        let backend = Arc::new(MockBackend::new());
        let channel = bound_channel(&backend, 1);
        backend.set_raw_hardware_id(1, vec![b'H', 0, 0x00, 0xD8, 0, 0]);
        assert_eq!(channel.hardware_id(), None);
    }

    #[test]
    fn test_second_bind_is_rejected() {
        let backend = Arc::new(MockBackend::new());
        let mut channel = bound_channel(&backend, 6);
        let first = channel.event();

        let second = backend.create_event().unwrap();
        let err = channel.bind_event(second).unwrap_err();
        assert!(matches!(
            err,
            InterceptionError::SyncBindingFailed { index: 6, .. }
        ));
        assert_eq!(channel.event(), first);

        channel.close();
        assert_eq!(backend.created_events(), 2);
        assert_eq!(backend.closed_events(), 2);
        assert_eq!(backend.double_closes(), 0);
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_short_query_reply_is_control_failure() {
        let backend = Arc::new(MockBackend::new().short_reply_at(7));
        let channel = bound_channel(&backend, 7);
        channel.set_filter(KeyFilter::ALL).unwrap();
        channel.set_precedence(3).unwrap();

        assert!(matches!(
            channel.filter(),
            Err(InterceptionError::ControlFailed {
                index: 7,
                code: ControlCode::GetFilter
            })
        ));
        assert!(matches!(
            channel.precedence(),
            Err(InterceptionError::ControlFailed {
                index: 7,
                code: ControlCode::GetPrecedence
            })
        ));

        let other = bound_channel(&backend, 8);
        assert_eq!(other.precedence().unwrap(), 0);
    }

    #[test]
    fn test_receive_and_send() {
        let backend = Arc::new(MockBackend::new());
        let channel = bound_channel(&backend, 4);

        assert_eq!(channel.receive().unwrap(), None);

        let stroke = Stroke::Key(KeyStroke::key_down(0x1E));
        backend.push_stroke(4, &stroke);
        let received = channel.receive().unwrap().unwrap();
        assert_eq!(received, stroke);

        channel.send(&received).unwrap();
        assert_eq!(backend.writes(), vec![(4, stroke.encode())]);
    }

    #[test]
    fn test_receive_short_frame_is_format_error() {
        let backend = Arc::new(MockBackend::new());
        let channel = bound_channel(&backend, 11);
        backend.push_frame(11, vec![0u8; 20]);

        let err = channel.receive().unwrap_err();
        assert!(matches!(
            err,
            InterceptionError::Format {
                role: Role::Mouse,
                expected: 24,
                actual: 20
            }
        ));
    }

    #[test]
    fn test_send_rejects_wrong_role() {
        let backend = Arc::new(MockBackend::new());
        let channel = bound_channel(&backend, 0);

        let err = channel
            .send(&Stroke::Mouse(MouseStroke::relative_move(1, 0)))
            .unwrap_err();
        assert!(matches!(
            err,
            InterceptionError::RoleMismatch {
                index: 0,
                expected: Role::Keyboard,
                found: Role::Mouse
            }
        ));
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let backend = Arc::new(MockBackend::new());
        let mut channel = bound_channel(&backend, 3);

        channel.close();
        channel.close();
        drop(channel);

        assert_eq!(backend.closed_devices(), 1);
        assert_eq!(backend.closed_events(), 1);
        assert_eq!(backend.double_closes(), 0);
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_closed_channel_reports_failure() {
        let backend = Arc::new(MockBackend::new());
        let mut channel = bound_channel(&backend, 5);
        channel.close();

        assert!(!channel.is_open());
        assert!(!channel.control(ControlCode::GetFilter, None, Some(2)).succeeded);
        assert!(matches!(
            channel.filter(),
            Err(InterceptionError::ControlFailed {
                index: 5,
                code: ControlCode::GetFilter
            })
        ));
        assert_eq!(channel.hardware_id(), None);
    }
}
