//! Logical commands and the input binding table.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies one physical input.
///
/// Pins use BCM numbering. Keys are the byte or key code delivered by the key
/// source. Pointer buttons are numbered from 1 (left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputId {
    /// A GPIO line.
    Pin(u16),
    /// A keyboard key code.
    Key(u32),
    /// A pointer (mouse) button.
    Pointer(u16),
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputId::Pin(pin) => write!(f, "pin {pin}"),
            InputId::Key(code) => match char::from_u32(*code) {
                Some(c) if c.is_ascii_graphic() => write!(f, "key '{c}'"),
                _ => write!(f, "key {code}"),
            },
            InputId::Pointer(button) => write!(f, "pointer button {button}"),
        }
    }
}

/// A logical command, independent of the input that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Step to the next preset on the scale ladder.
    NextFactor,
    /// Jump to an absolute scale factor.
    SetFactor(f64),
    /// Flip between normal and inverted colours.
    ToggleAppearance,
    /// Autofocus, or scale the lens position when a multiplier is given.
    Focus {
        /// Lens position multiplier; `None` triggers autofocus.
        multiplier: Option<f64>,
    },
    /// Change the scale factor by a relative amount.
    Zoom(f64),
    /// Add to the brightness control.
    AdjustBrightness(f64),
    /// Multiply the contrast control.
    AdjustContrast(f64),
    /// Save a still image.
    Capture,
    /// Capture a still and hand it to the read-aloud pipeline.
    ReadAloud,
    /// Stop the controller.
    Quit,
}

/// Maps one physical input to a command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// The physical input.
    pub input: InputId,
    /// The command it produces.
    pub command: Command,
}

impl Binding {
    /// Create a binding.
    pub fn new(input: InputId, command: Command) -> Self {
        Self { input, command }
    }
}

pub(crate) const KEY_INTERRUPT: u32 = 3;
pub(crate) const KEY_BACKSPACE: u32 = 8;
pub(crate) const KEY_TAB: u32 = 9;
pub(crate) const KEY_ENTER: u32 = 13;
pub(crate) const KEY_ESCAPE: u32 = 27;

/// Read-only lookup from physical input to command.
///
/// Built once at startup and shared between input pumps.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    map: HashMap<InputId, Command>,
}

impl BindingTable {
    /// Build a table from a list of bindings. Later entries win on duplicates.
    pub fn new(bindings: impl IntoIterator<Item = Binding>) -> Self {
        let mut map = HashMap::new();
        for binding in bindings {
            if let Some(previous) = map.insert(binding.input, binding.command) {
                debug!(
                    "{} rebound from {:?} to {:?}",
                    binding.input,
                    previous,
                    binding.command
                );
            }
        }
        Self { map }
    }

    /// The stock key, button and pointer map.
    pub fn default_bindings() -> Vec<Binding> {
        let key = |c: char| InputId::Key(c as u32);
        let mut bindings = vec![
            Binding::new(InputId::Key(KEY_ENTER), Command::NextFactor),
            Binding::new(key('/'), Command::ToggleAppearance),
            Binding::new(InputId::Key(KEY_ESCAPE), Command::Quit),
            Binding::new(InputId::Key(KEY_INTERRUPT), Command::Quit),
            Binding::new(key('0'), Command::SetFactor(10.0)),
            Binding::new(key('+'), Command::Zoom(0.5)),
            Binding::new(key('-'), Command::Zoom(-0.5)),
            Binding::new(key('f'), Command::Focus { multiplier: None }),
            Binding::new(key('c'), Command::Capture),
            Binding::new(key('r'), Command::ReadAloud),
            Binding::new(key(']'), Command::AdjustBrightness(5.0)),
            Binding::new(key('['), Command::AdjustBrightness(-5.0)),
            Binding::new(key('}'), Command::AdjustContrast(1.1)),
            Binding::new(key('{'), Command::AdjustContrast(0.9)),
            Binding::new(InputId::Pin(4), Command::NextFactor),
            Binding::new(InputId::Pin(18), Command::ToggleAppearance),
            Binding::new(InputId::Pointer(1), Command::NextFactor),
            Binding::new(InputId::Pointer(3), Command::ToggleAppearance),
        ];
        for digit in 1..=9u32 {
            bindings.push(Binding::new(
                InputId::Key('0' as u32 + digit),
                Command::SetFactor(f64::from(digit)),
            ));
        }
        bindings
    }

    /// Look up the command for an input. Unmapped inputs yield `None`.
    pub fn lookup(&self, input: InputId) -> Option<Command> {
        self.map.get(&input).copied()
    }

    /// Number of bound inputs.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no input is bound.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings_cover_stock_keys() {
        let table = BindingTable::new(BindingTable::default_bindings());

        assert_eq!(table.lookup(InputId::Key(13)), Some(Command::NextFactor));
        assert_eq!(
            table.lookup(InputId::Key('/' as u32)),
            Some(Command::ToggleAppearance)
        );
        assert_eq!(table.lookup(InputId::Key(27)), Some(Command::Quit));
        assert_eq!(table.lookup(InputId::Key(3)), Some(Command::Quit));
        assert_eq!(
            table.lookup(InputId::Key('0' as u32)),
            Some(Command::SetFactor(10.0))
        );
        assert_eq!(
            table.lookup(InputId::Key('7' as u32)),
            Some(Command::SetFactor(7.0))
        );
    }

    #[test]
    fn test_unmapped_input_is_none() {
        let table = BindingTable::new(BindingTable::default_bindings());
        assert_eq!(table.lookup(InputId::Pin(27)), None);
        assert_eq!(table.lookup(InputId::Key('z' as u32)), None);
        // a line feed after a digit must not also advance the factor
        assert_eq!(table.lookup(InputId::Key(10)), None);
    }

    #[test]
    fn test_later_binding_wins() {
        let table = BindingTable::new([
            Binding::new(InputId::Pin(4), Command::NextFactor),
            Binding::new(InputId::Pin(4), Command::Quit),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(InputId::Pin(4)), Some(Command::Quit));
    }

    #[test]
    fn test_input_display() {
        assert_eq!(InputId::Key('/' as u32).to_string(), "key '/'");
        assert_eq!(InputId::Key(13).to_string(), "key 13");
        assert_eq!(InputId::Pin(4).to_string(), "pin 4");
    }
}
