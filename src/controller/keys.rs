//! Key names and their Windows virtual-key codes.
//!
//! Names are case-insensitive: letters, digits, `f1`-`f24`, `numpad0`-`numpad9`,
//! modifiers, navigation keys, and a few common aliases (`esc`, `return`).

/// Windows virtual-key code.
pub type VirtualKey = u16;

const NAMED_KEYS: &[(&str, VirtualKey)] = &[
    ("backspace", 0x08),
    ("tab", 0x09),
    ("enter", 0x0D),
    ("return", 0x0D),
    ("shift", 0x10),
    ("ctrl", 0x11),
    ("control", 0x11),
    ("alt", 0x12),
    ("pause", 0x13),
    ("capslock", 0x14),
    ("esc", 0x1B),
    ("escape", 0x1B),
    ("space", 0x20),
    ("pageup", 0x21),
    ("pagedown", 0x22),
    ("end", 0x23),
    ("home", 0x24),
    ("left", 0x25),
    ("up", 0x26),
    ("right", 0x27),
    ("down", 0x28),
    ("insert", 0x2D),
    ("delete", 0x2E),
];

/// Resolves a key name to its virtual-key code.
pub fn parse_key(name: &str) -> Option<VirtualKey> {
    let name = name.trim().to_ascii_lowercase();

    if let Some(&(_, vk)) = NAMED_KEYS.iter().find(|(n, _)| *n == name) {
        return Some(vk);
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return match c {
            'a'..='z' => Some(c.to_ascii_uppercase() as VirtualKey),
            '0'..='9' => Some(c as VirtualKey),
            _ => None,
        };
    }

    if let Some(n) = name.strip_prefix("numpad") {
        return match n.parse::<u16>() {
            Ok(n @ 0..=9) => Some(0x60 + n),
            _ => None,
        };
    }

    if let Some(n) = name.strip_prefix('f') {
        return match n.parse::<u16>() {
            Ok(n @ 1..=24) => Some(0x70 + n - 1),
            _ => None,
        };
    }

    None
}

/// Folds the left/right modifier codes reported by low-level keyboard
/// events (`VK_LSHIFT`, `VK_RCONTROL`, ...) into the generic ones.
pub fn normalize_virtual_key(vk: VirtualKey) -> VirtualKey {
    match vk {
        0xA0 | 0xA1 => 0x10,
        0xA2 | 0xA3 => 0x11,
        0xA4 | 0xA5 => 0x12,
        other => other,
    }
}
