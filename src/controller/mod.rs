//! Game input control.
//!
//! Maps named actions to keys, gates them through an Idle/Active state
//! machine with a cooldown, and drives them from hotkeys or a polling loop.
//! Physical key releases are fed back so held keys are not released twice.

pub mod hotkey;
pub mod input;
pub mod keys;
pub mod release;
pub mod runner;
pub mod state;

#[cfg(windows)]
pub use hotkey::run_hotkey_loop;
pub use hotkey::{Hotkey, HotkeyAction, HotkeyTable};
#[cfg(windows)]
pub use input::SendInputKeys;
pub use input::KeySender;
pub use keys::{normalize_virtual_key, parse_key, VirtualKey};
#[cfg(windows)]
pub use release::KeyReleaseHook;
pub use runner::PollingLoop;
pub use state::{ControlState, DispatchOutcome, GameController};
