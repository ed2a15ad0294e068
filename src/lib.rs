//! # Interception Mux
//!
//! Device multiplexing and stroke codec for the Interception keyboard/mouse
//! driver on Windows.
//!
//! ## Features
//!
//! - Opens all 20 driver slots (10 keyboards, 10 mice) as one unit, with full
//!   rollback if any slot fails
//! - Blocking wait across every device with an optional timeout
//! - Per-device filter masks, precedence and hardware id queries
//! - Bit-exact encoding and decoding of keyboard and mouse strokes
//! - Pluggable OS backend, with an in-memory driver double for tests
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> interception_mux::Result<()> {
//! use interception_mux::{is_keyboard, DeviceRegistry, KeyFilter, Stroke};
//!
//! let registry = DeviceRegistry::open()?;
//! registry.set_filter(is_keyboard, KeyFilter::KEY_DOWN | KeyFilter::KEY_UP)?;
//!
//! while let Some(device) = registry.wait(-1) {
//!     if let Ok(Some(stroke)) = registry.receive(device) {
//!         if let Stroke::Key(key) = &stroke {
//!             if key.scan_code == 0x01 {
//!                 break;
//!             }
//!         }
//!         registry.send(device, &stroke)?;
//!     }
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! ## Configuration
//!
//! The `imux` binary reads its capture settings from JSON:
//!
//! ```json
//! {
//!   "keyboard_filter": "KEY_DOWN | KEY_UP",
//!   "mouse_filter": "LEFT_BUTTON_DOWN",
//!   "wait_timeout": "250ms",
//!   "exit_scan_code": 1
//! }
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod filter;
pub mod flags;
pub mod keys;
pub mod multiplexer;
pub mod registry;
pub mod stroke;

pub use backend::{Backend, RawHandle};
pub use config::Config;
pub use device::{classify, is_keyboard, is_mouse, DeviceChannel, DeviceIoResult, DeviceKind};
pub use error::{InterceptionError, Result};
pub use flags::{FilterMask, KeyFilter, KeyState, MouseButtons, MouseFilter, MouseFlags};
pub use registry::DeviceRegistry;
pub use stroke::{KeyStroke, MouseStroke, Role, Stroke};

#[cfg(windows)]
pub use backend::Win32Backend;
