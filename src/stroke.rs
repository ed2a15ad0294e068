//! Keyboard and mouse strokes and their binary framing.
//!
//! A stroke travels to and from the driver as a fixed-size little-endian
//! record:
//!
//! | shape  | bytes | layout |
//! |--------|-------|--------|
//! | key    | 12    | `unit_id:u16 scan_code:u16 flags:u16 reserved:u16 information:u32` |
//! | mouse  | 24    | `unit_id:u16 flags:u16 button_flags:u16 button_data:u16 raw_buttons:u32 x:i32 y:i32 information:u32` |
//!
//! `unit_id`, `reserved` and `raw_buttons` are filled in by the driver on
//! reads and ignored by it on writes. They are kept aside in
//! [`KeyMetadata`] / [`MouseMetadata`] and always encoded as zero.

use std::fmt;

use crate::error::{InterceptionError, Result};
use crate::flags::{KeyState, MouseButtons, MouseFlags};

/// Size of a keyboard frame on the wire.
pub const KEY_STROKE_SIZE: usize = 12;
/// Size of a mouse frame on the wire.
pub const MOUSE_STROKE_SIZE: usize = 24;

/// Device role, fixed by slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Keyboard,
    Mouse,
}

impl Role {
    /// Number of bytes in one frame for this role.
    pub const fn frame_size(self) -> usize {
        match self {
            Role::Keyboard => KEY_STROKE_SIZE,
            Role::Mouse => MOUSE_STROKE_SIZE,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Keyboard => f.write_str("keyboard"),
            Role::Mouse => f.write_str("mouse"),
        }
    }
}

/// Receive-only fields of a keyboard frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyMetadata {
    pub unit_id: u16,
    pub reserved: u16,
}

/// Receive-only fields of a mouse frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseMetadata {
    pub unit_id: u16,
    pub raw_buttons: u32,
}

/// A single key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyStroke {
    pub scan_code: u16,
    pub state: KeyState,
    pub information: u32,
    pub metadata: KeyMetadata,
}

impl KeyStroke {
    pub fn new(scan_code: u16, state: KeyState) -> Self {
        Self {
            scan_code,
            state,
            ..Self::default()
        }
    }

    pub fn key_down(scan_code: u16) -> Self {
        Self::new(scan_code, KeyState::DOWN)
    }

    pub fn key_up(scan_code: u16) -> Self {
        Self::new(scan_code, KeyState::UP)
    }

    pub fn is_key_up(&self) -> bool {
        self.state.contains(KeyState::UP)
    }

    pub fn encode(&self) -> [u8; KEY_STROKE_SIZE] {
        let mut buf = [0u8; KEY_STROKE_SIZE];
        // unit_id (0..2) and reserved (6..8) stay zero
        buf[2..4].copy_from_slice(&self.scan_code.to_le_bytes());
        buf[4..6].copy_from_slice(&self.state.bits().to_le_bytes());
        buf[8..12].copy_from_slice(&self.information.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; KEY_STROKE_SIZE] = buf
            .try_into()
            .map_err(|_| InterceptionError::format(Role::Keyboard, buf.len()))?;

        Ok(Self {
            scan_code: read_u16(buf, 2),
            state: KeyState::from_bits_retain(read_u16(buf, 4)),
            information: read_u32(buf, 8),
            metadata: KeyMetadata {
                unit_id: read_u16(buf, 0),
                reserved: read_u16(buf, 6),
            },
        })
    }
}

/// A single mouse movement, button change or wheel rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseStroke {
    pub flags: MouseFlags,
    pub button_flags: MouseButtons,
    pub button_data: u16,
    pub x: i32,
    pub y: i32,
    pub information: u32,
    pub metadata: MouseMetadata,
}

impl MouseStroke {
    pub fn relative_move(dx: i32, dy: i32) -> Self {
        Self {
            flags: MouseFlags::MOVE_RELATIVE,
            x: dx,
            y: dy,
            ..Self::default()
        }
    }

    /// Absolute move in the driver's `0..=0xFFFF` coordinate space.
    pub fn absolute_move(x: i32, y: i32) -> Self {
        Self {
            flags: MouseFlags::MOVE_ABSOLUTE,
            x,
            y,
            ..Self::default()
        }
    }

    pub fn button(buttons: MouseButtons) -> Self {
        Self {
            button_flags: buttons,
            ..Self::default()
        }
    }

    pub fn wheel(button_data: u16) -> Self {
        Self {
            button_flags: MouseButtons::WHEEL,
            button_data,
            ..Self::default()
        }
    }

    pub fn encode(&self) -> [u8; MOUSE_STROKE_SIZE] {
        let mut buf = [0u8; MOUSE_STROKE_SIZE];
        // unit_id (0..2) and raw_buttons (8..12) stay zero
        buf[2..4].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[4..6].copy_from_slice(&self.button_flags.bits().to_le_bytes());
        buf[6..8].copy_from_slice(&self.button_data.to_le_bytes());
        buf[12..16].copy_from_slice(&self.x.to_le_bytes());
        buf[16..20].copy_from_slice(&self.y.to_le_bytes());
        buf[20..24].copy_from_slice(&self.information.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; MOUSE_STROKE_SIZE] = buf
            .try_into()
            .map_err(|_| InterceptionError::format(Role::Mouse, buf.len()))?;

        Ok(Self {
            flags: MouseFlags::from_bits_retain(read_u16(buf, 2)),
            button_flags: MouseButtons::from_bits_retain(read_u16(buf, 4)),
            button_data: read_u16(buf, 6),
            x: read_u32(buf, 12) as i32,
            y: read_u32(buf, 16) as i32,
            information: read_u32(buf, 20),
            metadata: MouseMetadata {
                unit_id: read_u16(buf, 0),
                raw_buttons: read_u32(buf, 8),
            },
        })
    }
}

/// Either kind of stroke. The variant always matches the role of the
/// device it came from or is headed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Key(KeyStroke),
    Mouse(MouseStroke),
}

impl Stroke {
    pub fn role(&self) -> Role {
        match self {
            Stroke::Key(_) => Role::Keyboard,
            Stroke::Mouse(_) => Role::Mouse,
        }
    }

    /// Decodes one frame of the given role. The buffer must be exactly one
    /// frame long.
    pub fn decode(buf: &[u8], role: Role) -> Result<Self> {
        match role {
            Role::Keyboard => KeyStroke::decode(buf).map(Stroke::Key),
            Role::Mouse => MouseStroke::decode(buf).map(Stroke::Mouse),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Stroke::Key(key) => key.encode().to_vec(),
            Stroke::Mouse(mouse) => mouse.encode().to_vec(),
        }
    }

    pub fn as_key(&self) -> Option<&KeyStroke> {
        match self {
            Stroke::Key(key) => Some(key),
            Stroke::Mouse(_) => None,
        }
    }

    pub fn as_mouse(&self) -> Option<&MouseStroke> {
        match self {
            Stroke::Mouse(mouse) => Some(mouse),
            Stroke::Key(_) => None,
        }
    }
}

impl From<KeyStroke> for Stroke {
    fn from(stroke: KeyStroke) -> Self {
        Stroke::Key(stroke)
    }
}

impl From<MouseStroke> for Stroke {
    fn from(stroke: MouseStroke) -> Self {
        Stroke::Mouse(stroke)
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stroke_round_trip() {
        let strokes = [
            KeyStroke::key_down(0x1E),
            KeyStroke::key_up(0x01),
            KeyStroke {
                scan_code: 0xFFFF,
                state: KeyState::UP | KeyState::E0,
                information: 0xDEAD_BEEF,
                metadata: KeyMetadata::default(),
            },
            KeyStroke {
                scan_code: 0x1D,
                state: KeyState::from_bits_retain(0x8000),
                information: 0,
                metadata: KeyMetadata::default(),
            },
        ];

        for stroke in strokes {
            let decoded = KeyStroke::decode(&stroke.encode()).unwrap();
            assert_eq!(decoded.scan_code, stroke.scan_code);
            assert_eq!(decoded.state, stroke.state);
            assert_eq!(decoded.information, stroke.information);
        }
    }

    #[test]
    fn test_mouse_stroke_round_trip() {
        let mut wheel = MouseStroke::wheel(crate::flags::WHEEL_DOWN);
        wheel.information = 7;
        let strokes = [
            MouseStroke::relative_move(-15, 42),
            MouseStroke::absolute_move(0xFFFF, 0),
            MouseStroke::button(MouseButtons::RIGHT_BUTTON_DOWN),
            wheel,
            MouseStroke {
                flags: MouseFlags::MOVE_ABSOLUTE | MouseFlags::VIRTUAL_DESKTOP,
                button_flags: MouseButtons::BUTTON_4_UP,
                button_data: 0xFFFF,
                x: i32::MIN,
                y: i32::MAX,
                information: u32::MAX,
                metadata: MouseMetadata::default(),
            },
        ];

        for stroke in strokes {
            let decoded = MouseStroke::decode(&stroke.encode()).unwrap();
            assert_eq!(decoded, stroke);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_lengths() {
        for len in [0, 1, 11, 13, 23, 24, 500] {
            let buf = vec![0u8; len];
            let err = Stroke::decode(&buf, Role::Keyboard).unwrap_err();
            assert!(matches!(
                err,
                InterceptionError::Format {
                    role: Role::Keyboard,
                    expected: 12,
                    actual
                } if actual == len
            ));
        }

        for len in [0, 12, 23, 25, 48] {
            let buf = vec![0u8; len];
            let err = Stroke::decode(&buf, Role::Mouse).unwrap_err();
            assert!(matches!(
                err,
                InterceptionError::Format {
                    role: Role::Mouse,
                    expected: 24,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_key_wire_offsets() {
        let stroke = KeyStroke {
            scan_code: 0x1E,
            state: KeyState::UP,
            information: 0x0403_0201,
            metadata: KeyMetadata::default(),
        };
        assert_eq!(
            stroke.encode(),
            [0, 0, 0x1E, 0, 0x01, 0, 0, 0, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_mouse_wire_offsets() {
        let stroke = MouseStroke {
            flags: MouseFlags::MOVE_ABSOLUTE,
            button_flags: MouseButtons::LEFT_BUTTON_UP,
            button_data: 0x0078,
            x: -1,
            y: 0x100,
            information: 9,
            metadata: MouseMetadata::default(),
        };
        let buf = stroke.encode();
        assert_eq!(&buf[0..2], &[0, 0]);
        assert_eq!(&buf[2..4], &[0x01, 0]);
        assert_eq!(&buf[4..6], &[0x02, 0]);
        assert_eq!(&buf[6..8], &[0x78, 0]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 0]);
        assert_eq!(&buf[12..16], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&buf[16..20], &[0x00, 0x01, 0, 0]);
        assert_eq!(&buf[20..24], &[9, 0, 0, 0]);
    }

    #[test]
    fn test_metadata_captured_but_not_written() {
        let wire = [0x05, 0x00, 0x1E, 0x00, 0x00, 0x00, 0x34, 0x12, 0, 0, 0, 0];
        let stroke = KeyStroke::decode(&wire).unwrap();
        assert_eq!(stroke.metadata.unit_id, 5);
        assert_eq!(stroke.metadata.reserved, 0x1234);

        let rewritten = stroke.encode();
        assert_ne!(rewritten, wire);
        assert_eq!(&rewritten[0..2], &[0, 0]);
        assert_eq!(&rewritten[6..8], &[0, 0]);

        let mut wire = [0u8; MOUSE_STROKE_SIZE];
        wire[0] = 2;
        wire[8] = 0x03;
        let stroke = MouseStroke::decode(&wire).unwrap();
        assert_eq!(stroke.metadata.unit_id, 2);
        assert_eq!(stroke.metadata.raw_buttons, 3);
        assert_eq!(&stroke.encode()[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_stroke_roles() {
        let key: Stroke = KeyStroke::key_down(0x1C).into();
        let mouse: Stroke = MouseStroke::relative_move(1, 1).into();
        assert_eq!(key.role(), Role::Keyboard);
        assert_eq!(mouse.role(), Role::Mouse);
        assert_eq!(key.encode().len(), Role::Keyboard.frame_size());
        assert_eq!(mouse.encode().len(), Role::Mouse.frame_size());
        assert!(key.as_mouse().is_none());
        assert_eq!(mouse.as_mouse().map(|m| m.x), Some(1));
    }
}
