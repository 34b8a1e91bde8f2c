//! Keyboard command input.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::VecDeque;
use std::time::Duration;

use crate::session::Command;

pub trait KeySource {
    /// Wait at most `timeout` for one command.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Command>>;
}

/// Reads single key presses from the controlling terminal.
///
/// The terminal is switched to raw mode for the lifetime of the value and
/// restored on drop.
pub struct TerminalKeys {
    _private: (),
}

impl TerminalKeys {
    pub fn new() -> Result<Self> {
        enable_raw_mode().context("enable terminal raw mode")?;
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            log::warn!("failed to restore terminal mode: {}", err);
        }
    }
}

impl KeySource for TerminalKeys {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Command>> {
        if !event::poll(timeout).context("poll terminal events")? {
            return Ok(None);
        }
        match event::read().context("read terminal event")? {
            Event::Key(key) => Ok(command_for_key(key)),
            _ => Ok(None),
        }
    }
}

fn command_for_key(key: KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char(c) => Command::from_key(c.to_ascii_lowercase()),
        _ => None,
    }
}

/// Replays a fixed sequence of poll results, one per call.
///
/// Once the script is exhausted every poll returns `Quit`, so a scripted run
/// always terminates.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    script: VecDeque<Option<Command>>,
    polls: usize,
}

impl ScriptedKeys {
    pub fn new(script: impl IntoIterator<Item = Option<Command>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            polls: 0,
        }
    }

    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<Command>> {
        self.polls += 1;
        Ok(self.script.pop_front().unwrap_or(Some(Command::Quit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn terminal_keys_map_to_commands() {
        assert_eq!(
            command_for_key(press(KeyCode::Char('S'), KeyModifiers::SHIFT)),
            Some(Command::Upload)
        );
        assert_eq!(
            command_for_key(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Command::Quit)
        );
        assert_eq!(
            command_for_key(press(KeyCode::Esc, KeyModifiers::NONE)),
            Some(Command::Quit)
        );
        assert_eq!(command_for_key(press(KeyCode::Enter, KeyModifiers::NONE)), None);
    }

    #[test]
    fn scripted_keys_quit_when_exhausted() -> Result<()> {
        let mut keys = ScriptedKeys::new([None, Some(Command::ToggleMode)]);
        assert_eq!(keys.poll(Duration::ZERO)?, None);
        assert_eq!(keys.poll(Duration::ZERO)?, Some(Command::ToggleMode));
        assert_eq!(keys.poll(Duration::ZERO)?, Some(Command::Quit));
        assert_eq!(keys.polls(), 3);
        Ok(())
    }
}
