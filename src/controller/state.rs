//! Input control state machine.
//!
//! The controller is either `Idle` or `Active`. Actions are only turned into
//! key presses while active, and at most once per cooldown period. Keys held
//! by non-tap actions are tracked so `stop()` can release every one of them.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use super::input::KeySender;
use super::keys::{normalize_virtual_key, parse_key, VirtualKey};
use crate::config::ControllerConfig;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Actions are ignored
    Idle,
    /// Actions are dispatched as key presses
    Active,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::Idle => write!(f, "Idle"),
            ControlState::Active => write!(f, "Active"),
        }
    }
}

/// What `dispatch` did with an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The key was pressed (and released, for tap actions)
    Executed { key: String },
    /// The controller is idle
    Inactive,
    /// The previous action was too recent
    CoolingDown,
    /// No key is mapped to the action
    Unmapped,
}

/// Turns named actions into key presses.
pub struct GameController<S> {
    sender: S,
    key_mapping: BTreeMap<String, String>,
    tap_actions: BTreeSet<String>,
    cooldown: Duration,
    state: ControlState,
    held_keys: BTreeSet<String>,
    last_action: Option<Instant>,
}

impl<S: KeySender> GameController<S> {
    pub fn new(
        sender: S,
        key_mapping: BTreeMap<String, String>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            sender,
            key_mapping,
            tap_actions: config.tap_actions.iter().cloned().collect(),
            cooldown: config.cooldown(),
            state: ControlState::Idle,
            held_keys: BTreeSet::new(),
            last_action: None,
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ControlState::Active
    }

    /// Keys currently held down by this controller.
    pub fn held_keys(&self) -> impl Iterator<Item = &str> {
        self.held_keys.iter().map(String::as_str)
    }

    /// Enables action dispatch.
    pub fn start(&mut self) {
        self.state = ControlState::Active;
        crate::log("Control started");
    }

    /// Releases every held key, then disables action dispatch.
    ///
    /// All keys are attempted even if one release fails; the first error is
    /// returned after the transition to `Idle`.
    pub fn stop(&mut self) -> Result<()> {
        let mut first_error = None;
        for key in std::mem::take(&mut self.held_keys) {
            match self.sender.release(&key) {
                Ok(()) => crate::log(&format!("Released lingering key: {}", key)),
                Err(e) => {
                    crate::log(&format!("Failed to release key {}: {}", key, e));
                    first_error.get_or_insert(e);
                }
            }
        }
        self.state = ControlState::Idle;
        crate::log("Control stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Dispatches a named action.
    pub fn dispatch(&mut self, action: &str) -> Result<DispatchOutcome> {
        if !self.is_active() {
            return Ok(DispatchOutcome::Inactive);
        }

        let now = Instant::now();
        if let Some(last) = self.last_action {
            if now.duration_since(last) < self.cooldown {
                return Ok(DispatchOutcome::CoolingDown);
            }
        }

        let Some(key) = self.key_mapping.get(action).cloned() else {
            return Ok(DispatchOutcome::Unmapped);
        };

        self.sender
            .press(&key)
            .with_context(|| format!("Failed to press {} for {}", key, action))?;
        self.held_keys.insert(key.clone());

        if self.tap_actions.contains(action) {
            self.sender
                .release(&key)
                .with_context(|| format!("Failed to release {} for {}", key, action))?;
            self.held_keys.remove(&key);
        }

        self.last_action = Some(now);
        crate::log(&format!("Executed action: {} (Key: {})", action, key));
        Ok(DispatchOutcome::Executed { key })
    }

    /// Records that a key was released outside the controller.
    pub fn key_released(&mut self, key: &str) {
        self.held_keys.remove(key);
    }

    /// Untracks every held key whose name resolves to `vk`.
    pub fn virtual_key_released(&mut self, vk: VirtualKey) {
        let vk = normalize_virtual_key(vk);
        let released: Vec<String> = self
            .held_keys
            .iter()
            .filter(|key| parse_key(key) == Some(vk))
            .cloned()
            .collect();
        for key in released {
            self.key_released(&key);
            crate::log(&format!("Key released externally: {}", key));
        }
    }
}

impl<S> Drop for GameController<S> {
    fn drop(&mut self) {
        if !self.held_keys.is_empty() {
            crate::log(&format!(
                "Controller dropped with {} held keys; call stop() to release them",
                self.held_keys.len()
            ));
        }
    }
}
