//! Operator commands
//!
//! The control surface sends a single word: `start`, `stop`, or the name of
//! an effect to overlay.

use std::str::FromStr;

use crate::error::Error;

/// Operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Overlay(String),
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = s.trim();
        if command.is_empty() {
            return Err(Error::InvalidCommand(s.to_string()));
        }

        Ok(match command.to_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            effect => Command::Overlay(effect.to_string()),
        })
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::Overlay(effect) => write!(f, "overlay {}", effect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("start".parse::<Command>().unwrap(), Command::Start);
        assert_eq!(" STOP\n".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!(
            "Applause".parse::<Command>().unwrap(),
            Command::Overlay("applause".into())
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(
            "   ".parse::<Command>(),
            Err(Error::InvalidCommand(_))
        ));
    }
}
