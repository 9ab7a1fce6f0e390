/// Inbound viewer commands: `keydown <key>`, `keyup <key>`, `click <button> <x> <y>`
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A mouse click as reported by the viewer, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub button: i32,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    KeyDown(String),
    KeyUp(String),
    Click(Click),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let mut fields = input.split_whitespace();
        let verb = fields.next().ok_or(ProtocolError::Empty)?;

        match verb {
            "keydown" => key_arg(fields.next(), "keydown").map(Command::KeyDown),
            "keyup" => key_arg(fields.next(), "keyup").map(Command::KeyUp),
            "click" => {
                let button = int_arg(fields.next(), "button")?;
                let x = int_arg(fields.next(), "x")?;
                let y = int_arg(fields.next(), "y")?;
                Ok(Command::Click(Click { button, x, y }))
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

fn key_arg(field: Option<&str>, command: &'static str) -> Result<String, ProtocolError> {
    field.map(str::to_string).ok_or(ProtocolError::MissingArgument {
        command,
        argument: "key",
    })
}

fn int_arg(field: Option<&str>, argument: &'static str) -> Result<i32, ProtocolError> {
    let raw = field.ok_or(ProtocolError::MissingArgument {
        command: "click",
        argument,
    })?;
    raw.parse().map_err(|_| ProtocolError::InvalidNumber {
        command: "click",
        argument,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys() {
        assert_eq!(Command::parse("keydown ArrowLeft"), Ok(Command::KeyDown("ArrowLeft".into())));
        assert_eq!(Command::parse("  keyup   space "), Ok(Command::KeyUp("space".into())));
    }

    #[test]
    fn parses_click() {
        assert_eq!(
            "click 0 120 -5".parse::<Command>(),
            Ok(Command::Click(Click { button: 0, x: 120, y: -5 }))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Command::parse(""), Err(ProtocolError::Empty));
        assert_eq!(Command::parse("   "), Err(ProtocolError::Empty));
        assert!(matches!(Command::parse("jump high"), Err(ProtocolError::UnknownCommand(_))));
        assert!(matches!(Command::parse("keydown"), Err(ProtocolError::MissingArgument { .. })));
        assert!(matches!(Command::parse("click 0 12"), Err(ProtocolError::MissingArgument { argument: "y", .. })));
        assert!(matches!(Command::parse("click 0 1.5 2"), Err(ProtocolError::InvalidNumber { argument: "x", .. })));
    }
}
