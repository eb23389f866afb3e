//! Global hotkey bindings.
//!
//! Hotkeys are written as `+`-separated modifiers followed by one key, e.g.
//! `ctrl+shift+s`. Each binding maps to a `HotkeyAction`. The Win32 dispatcher
//! registers every binding for the calling thread and pumps `WM_HOTKEY` until
//! the handler asks it to stop.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;

use super::keys::{parse_key, VirtualKey};

/// Modifier flags plus one non-modifier key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Hotkey {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
    pub key: VirtualKey,
}

impl Hotkey {
    pub fn parse(text: &str) -> Result<Self> {
        let mut hotkey = Hotkey {
            ctrl: false,
            alt: false,
            shift: false,
            win: false,
            key: 0,
        };

        let parts: Vec<String> = text
            .split('+')
            .map(|p| p.trim().to_ascii_lowercase())
            .collect();
        let Some((key, modifiers)) = parts.split_last() else {
            return Err(anyhow!("Empty hotkey"));
        };

        for modifier in modifiers {
            let flag = match modifier.as_str() {
                "ctrl" | "control" => &mut hotkey.ctrl,
                "alt" => &mut hotkey.alt,
                "shift" => &mut hotkey.shift,
                "win" | "super" => &mut hotkey.win,
                other => return Err(anyhow!("Unknown modifier '{}' in '{}'", other, text)),
            };
            if *flag {
                return Err(anyhow!("Duplicate modifier '{}' in '{}'", modifier, text));
            }
            *flag = true;
        }

        if matches!(key.as_str(), "ctrl" | "control" | "alt" | "shift" | "win") {
            return Err(anyhow!("Hotkey '{}' has no key after its modifiers", text));
        }
        hotkey.key = parse_key(key).ok_or_else(|| anyhow!("Unknown key '{}' in '{}'", key, text))?;

        if !(hotkey.ctrl || hotkey.alt || hotkey.shift || hotkey.win) {
            return Err(anyhow!("Hotkey '{}' needs at least one modifier", text));
        }
        Ok(hotkey)
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, name) in [
            (self.ctrl, "Ctrl+"),
            (self.alt, "Alt+"),
            (self.shift, "Shift+"),
            (self.win, "Win+"),
        ] {
            if on {
                write!(f, "{}", name)?;
            }
        }
        write!(f, "0x{:02X}", self.key)
    }
}

/// What a hotkey does when pressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HotkeyAction {
    Capture,
    StartControl,
    StopControl,
    /// Dispatch a mapped game action
    Action(String),
    Quit,
}

impl HotkeyAction {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "capture" => HotkeyAction::Capture,
            "start" => HotkeyAction::StartControl,
            "stop" => HotkeyAction::StopControl,
            "quit" => HotkeyAction::Quit,
            other => HotkeyAction::Action(other.to_string()),
        }
    }
}

impl fmt::Display for HotkeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyAction::Capture => write!(f, "capture"),
            HotkeyAction::StartControl => write!(f, "start control"),
            HotkeyAction::StopControl => write!(f, "stop control"),
            HotkeyAction::Action(name) => write!(f, "action '{}'", name),
            HotkeyAction::Quit => write!(f, "quit"),
        }
    }
}

/// Parsed hotkey bindings, in config order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HotkeyTable {
    bindings: Vec<(Hotkey, HotkeyAction)>,
}

impl HotkeyTable {
    /// Parses a `hotkey → action tag` map. Two strings naming the same
    /// combination are rejected.
    pub fn from_config(hotkeys: &BTreeMap<String, String>) -> Result<Self> {
        let mut bindings: Vec<(Hotkey, HotkeyAction)> = Vec::with_capacity(hotkeys.len());
        for (text, tag) in hotkeys {
            let hotkey = Hotkey::parse(text)?;
            if bindings.iter().any(|(existing, _)| *existing == hotkey) {
                return Err(anyhow!("Hotkey '{}' is bound more than once", text));
            }
            bindings.push((hotkey, HotkeyAction::from_tag(tag)));
        }
        Ok(Self { bindings })
    }

    pub fn bindings(&self) -> &[(Hotkey, HotkeyAction)] {
        &self.bindings
    }

    pub fn action_for(&self, hotkey: &Hotkey) -> Option<&HotkeyAction> {
        self.bindings
            .iter()
            .find(|(h, _)| h == hotkey)
            .map(|(_, action)| action)
    }

    pub fn has_quit(&self) -> bool {
        self.bindings
            .iter()
            .any(|(_, action)| *action == HotkeyAction::Quit)
    }
}

/// Interprets a `GetMessageW` return value: `Ok(true)` when a message was
/// retrieved, `Ok(false)` on `WM_QUIT`, an error when retrieval failed.
pub(crate) fn message_received(ret: i32) -> Result<bool> {
    match ret {
        -1 => Err(anyhow!("GetMessageW failed")),
        0 => Ok(false),
        _ => Ok(true),
    }
}

#[cfg(windows)]
pub use win32::run_hotkey_loop;

#[cfg(windows)]
mod win32 {
    use anyhow::Result;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT,
        MOD_SHIFT, MOD_WIN,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    use super::{message_received, Hotkey, HotkeyAction, HotkeyTable};

    fn modifiers(hotkey: &Hotkey) -> HOT_KEY_MODIFIERS {
        let mut mods = MOD_NOREPEAT;
        if hotkey.ctrl {
            mods = mods | MOD_CONTROL;
        }
        if hotkey.alt {
            mods = mods | MOD_ALT;
        }
        if hotkey.shift {
            mods = mods | MOD_SHIFT;
        }
        if hotkey.win {
            mods = mods | MOD_WIN;
        }
        mods
    }

    /// Registers every binding for the calling thread and runs the message
    /// loop. `handler` returns `false` to end the loop. All registrations are
    /// removed before returning.
    pub fn run_hotkey_loop<F>(table: &HotkeyTable, mut handler: F) -> Result<()>
    where
        F: FnMut(&HotkeyAction) -> bool,
    {
        let mut registered: Vec<i32> = Vec::new();
        let mut result = Ok(());

        for (index, (hotkey, action)) in table.bindings().iter().enumerate() {
            let id = index as i32 + 1;
            let ok = unsafe {
                RegisterHotKey(HWND::default(), id, modifiers(hotkey), hotkey.key as u32)
            };
            match ok {
                Ok(()) => {
                    registered.push(id);
                    crate::log(&format!("Hotkey: {} ({})", hotkey, action));
                }
                Err(e) => {
                    result = Err(anyhow::anyhow!(
                        "Failed to register hotkey {} ({}): {}",
                        hotkey,
                        action,
                        e
                    ));
                    break;
                }
            }
        }

        if result.is_ok() {
            let mut msg = MSG::default();
            loop {
                let ret = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
                match message_received(ret.0) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
                if msg.message != WM_HOTKEY {
                    continue;
                }
                let index = msg.wParam.0.wrapping_sub(1);
                let Some((_, action)) = table.bindings().get(index) else {
                    continue;
                };
                if !handler(action) {
                    break;
                }
            }
        }

        for id in registered {
            unsafe {
                let _ = UnregisterHotKey(HWND::default(), id);
            }
        }
        result
    }
}
