//! Bit sets carried inside strokes and the filter masks that select them.
//!
//! Stroke state and filter masks are separate types on purpose: a key filter
//! bit sits one position above the key state bit it selects, and `KEY_DOWN` is
//! the absence of `UP` in a stroke but a real bit in a filter. The
//! [`KeyFilter::matching`] and [`MouseFilter::matching`] functions are the
//! only place where the two vocabularies meet.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::stroke::MouseStroke;

bitflags! {
    /// `Flags` member of a keyboard stroke (RAWKEYBOARD).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyState: u16 {
        const UP = 0x01;
        const E0 = 0x02;
        const E1 = 0x04;
        const TERMSRV_SET_LED = 0x08;
        const TERMSRV_SHADOW = 0x10;
        const TERMSRV_VKPACKET = 0x20;
    }
}

impl KeyState {
    /// A key press carries no bits.
    pub const DOWN: Self = Self::empty();
}

bitflags! {
    /// Keyboard filter mask understood by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct KeyFilter: u16 {
        const KEY_DOWN = 0x01;
        const KEY_UP = 0x02;
        const KEY_E0 = 0x04;
        const KEY_E1 = 0x08;
        const KEY_TERMSRV_SET_LED = 0x10;
        const KEY_TERMSRV_SHADOW = 0x20;
        const KEY_TERMSRV_VKPACKET = 0x40;
        const ALL = 0xFFFF;
    }
}

impl KeyFilter {
    pub const NONE: Self = Self::empty();

    /// The filter bits a stroke with `state` would pass through.
    pub fn matching(state: KeyState) -> Self {
        let direction = if state.contains(KeyState::UP) {
            Self::KEY_UP
        } else {
            Self::KEY_DOWN
        };
        let rest = (state - KeyState::UP).bits() << 1;
        direction | Self::from_bits_retain(rest)
    }
}

bitflags! {
    /// `usFlags` member of a mouse stroke (RAWMOUSE).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseFlags: u16 {
        const MOVE_ABSOLUTE = 0x001;
        const VIRTUAL_DESKTOP = 0x002;
        const ATTRIBUTES_CHANGED = 0x004;
        const MOVE_NOCOALESCE = 0x008;
        const TERMSRV_SRC_SHADOW = 0x100;
    }
}

impl MouseFlags {
    pub const MOVE_RELATIVE: Self = Self::empty();
}

bitflags! {
    /// `usButtonFlags` member of a mouse stroke.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u16 {
        const LEFT_BUTTON_DOWN = 0x001;
        const LEFT_BUTTON_UP = 0x002;
        const RIGHT_BUTTON_DOWN = 0x004;
        const RIGHT_BUTTON_UP = 0x008;
        const MIDDLE_BUTTON_DOWN = 0x010;
        const MIDDLE_BUTTON_UP = 0x020;
        const BUTTON_4_DOWN = 0x040;
        const BUTTON_4_UP = 0x080;
        const BUTTON_5_DOWN = 0x100;
        const BUTTON_5_UP = 0x200;
        const WHEEL = 0x400;
        const HWHEEL = 0x800;
    }
}

impl MouseButtons {
    /// Down/up pair for a named button (`left`, `right`, `middle`, `mouse4`, `mouse5`).
    pub fn button_pair(name: &str) -> Option<(Self, Self)> {
        let pair = match name.to_lowercase().as_str() {
            "left" => (Self::LEFT_BUTTON_DOWN, Self::LEFT_BUTTON_UP),
            "right" => (Self::RIGHT_BUTTON_DOWN, Self::RIGHT_BUTTON_UP),
            "middle" => (Self::MIDDLE_BUTTON_DOWN, Self::MIDDLE_BUTTON_UP),
            "mouse4" => (Self::BUTTON_4_DOWN, Self::BUTTON_4_UP),
            "mouse5" => (Self::BUTTON_5_DOWN, Self::BUTTON_5_UP),
            _ => return None,
        };
        Some(pair)
    }
}

bitflags! {
    /// Mouse filter mask understood by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MouseFilter: u16 {
        const LEFT_BUTTON_DOWN = 0x001;
        const LEFT_BUTTON_UP = 0x002;
        const RIGHT_BUTTON_DOWN = 0x004;
        const RIGHT_BUTTON_UP = 0x008;
        const MIDDLE_BUTTON_DOWN = 0x010;
        const MIDDLE_BUTTON_UP = 0x020;
        const BUTTON_4_DOWN = 0x040;
        const BUTTON_4_UP = 0x080;
        const BUTTON_5_DOWN = 0x100;
        const BUTTON_5_UP = 0x200;
        const WHEEL = 0x400;
        const HWHEEL = 0x800;
        const MOVE = 0x1000;
        const ALL = 0xFFFF;
    }
}

impl MouseFilter {
    pub const NONE: Self = Self::empty();

    /// The filter bits a mouse stroke would pass through.
    pub fn matching(stroke: &MouseStroke) -> Self {
        let mut filter = Self::from_bits_retain(stroke.button_flags.bits() & 0x0FFF);
        if stroke.x != 0 || stroke.y != 0 {
            filter |= Self::MOVE;
        }
        filter
    }
}

/// Wheel rotation of one notch, as carried in `button_data`.
pub const WHEEL_DELTA: i16 = 120;
/// `button_data` for one notch away from the user.
pub const WHEEL_UP: u16 = 0x0078;
/// `button_data` for one notch towards the user.
pub const WHEEL_DOWN: u16 = 0xFF88;

/// Role-neutral 16-bit filter value as stored by the driver.
///
/// Its meaning depends on the role of the device it is applied to; use
/// [`FilterMask::as_key_filter`] or [`FilterMask::as_mouse_filter`] to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FilterMask(pub u16);

impl FilterMask {
    pub const NONE: Self = Self(0x0000);
    pub const ALL: Self = Self(0xFFFF);

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn as_key_filter(self) -> KeyFilter {
        KeyFilter::from_bits_retain(self.0)
    }

    pub fn as_mouse_filter(self) -> MouseFilter {
        MouseFilter::from_bits_retain(self.0)
    }
}

impl From<KeyFilter> for FilterMask {
    fn from(filter: KeyFilter) -> Self {
        Self(filter.bits())
    }
}

impl From<MouseFilter> for FilterMask {
    fn from(filter: MouseFilter) -> Self {
        Self(filter.bits())
    }
}

impl From<u16> for FilterMask {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}
