//! Human-readable warnings for the CLI.

use colored::Colorize;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Warning {
    pub message: String,
    pub position: Option<Position>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Warning {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, offset: usize) -> Self {
        Warning {
            message: message.into(),
            position: Some(Position {
                start: offset,
                end: offset,
            }),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", "warning".yellow().bold())?;
        if let Some(position) = self.position {
            write!(f, " (byte {:?})", position)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// An inclusive range of byte offsets in the source.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[test]
fn warning_display_mentions_position() {
    colored::control::set_override(false);
    let warning = Warning::at("This ] has no matching [", 7);
    assert_eq!(
        warning.to_string(),
        "warning (byte 7): This ] has no matching ["
    );
}

#[test]
fn position_debug_range() {
    assert_eq!(format!("{:?}", Position { start: 2, end: 5 }), "2-5");
    assert_eq!(format!("{:?}", Position { start: 3, end: 3 }), "3");
}
