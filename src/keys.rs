//! Extended-key resolution.
//!
//! Some keys share a scan code with a non-extended key and must be sent with
//! the `E0` state bit. The explicit table below decides first; the prefix of
//! an extended scan code (as returned by `MapVirtualKey` with
//! `MAPVK_VK_TO_VSC_EX`) is consulted only for keys not in the table.

use crate::flags::KeyState;

/// Virtual keys that are always extended.
pub const EXTENDED_VIRTUAL_KEYS: [u8; 11] = [
    0xA5, // VK_RMENU
    0x2E, // VK_DELETE
    0x2D, // VK_INSERT
    0x22, // VK_NEXT
    0x21, // VK_PRIOR
    0x24, // VK_HOME
    0x23, // VK_END
    0x25, // VK_LEFT
    0x27, // VK_RIGHT
    0x26, // VK_UP
    0x28, // VK_DOWN
];

pub fn is_extended_key(vk_code: u8, scan_code_ex: u16) -> bool {
    if EXTENDED_VIRTUAL_KEYS.contains(&vk_code) {
        return true;
    }
    matches!(scan_code_ex >> 8, 0xE0 | 0xE1)
}

/// Key state for a press or release of the given key.
pub fn key_state(vk_code: u8, scan_code_ex: u16, key_up: bool) -> KeyState {
    let mut state = if key_up { KeyState::UP } else { KeyState::DOWN };
    if is_extended_key(vk_code, scan_code_ex) {
        state |= KeyState::E0;
    }
    state
}
