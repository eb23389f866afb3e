//! Keyboard input simulation.
//!
//! `KeySender` is a stateless press/release interface. The Win32
//! implementation uses `SendInput`, which the game's input layer accepts
//! like hardware input as long as its window has focus.

use anyhow::{anyhow, Result};

use super::keys::parse_key;

/// Presses and releases keys by name.
pub trait KeySender {
    fn press(&mut self, key: &str) -> Result<()>;
    fn release(&mut self, key: &str) -> Result<()>;
}

/// Resolves a key name or fails with a readable error.
#[cfg_attr(not(windows), allow(dead_code))]
fn virtual_key(key: &str) -> Result<u16> {
    parse_key(key).ok_or_else(|| anyhow!("Unknown key '{}'", key))
}

#[cfg(windows)]
pub use win32::SendInputKeys;

#[cfg(windows)]
mod win32 {
    use anyhow::{anyhow, Result};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
        VIRTUAL_KEY,
    };

    use super::{virtual_key, KeySender};

    /// Sends key events through `SendInput`.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SendInputKeys;

    impl SendInputKeys {
        fn send(&self, key: &str, flags: KEYBD_EVENT_FLAGS) -> Result<()> {
            let vk = virtual_key(key)?;
            let input = INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(vk),
                        dwFlags: flags,
                        ..Default::default()
                    },
                },
            };

            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            if sent != 1 {
                return Err(anyhow!("SendInput sent {} of 1 events for '{}'", sent, key));
            }
            Ok(())
        }
    }

    impl KeySender for SendInputKeys {
        fn press(&mut self, key: &str) -> Result<()> {
            self.send(key, KEYBD_EVENT_FLAGS(0))
        }

        fn release(&mut self, key: &str) -> Result<()> {
            self.send(key, KEYEVENTF_KEYUP)
        }
    }
}
