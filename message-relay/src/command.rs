//! Operator input parsing for the interactive client.

use anyhow::{Result, anyhow, bail};

pub const USAGE: &str = "commands: LIST | REGISTER | SEND <user> <message>";

/// A line typed at the client prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    List,
    /// Re-send the registration for the configured name.
    Register,
    Send { destination: String, message: String },
}

impl OperatorCommand {
    /// Parses one input line. Returns `Ok(None)` for blank lines.
    ///
    /// The keyword is case-insensitive. For `SEND` the first word after the
    /// keyword is the destination and everything after it, verbatim, is the
    /// message.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (keyword, rest) = split_word(line);
        let command = match keyword.to_ascii_uppercase().as_str() {
            "LIST" => Self::List,
            "REGISTER" => Self::Register,
            "SEND" => {
                let (destination, message) = split_word(rest);
                if destination.is_empty() || message.is_empty() {
                    bail!("usage: SEND <user> <message>");
                }
                Self::Send {
                    destination: destination.to_string(),
                    message: message.to_string(),
                }
            }
            other => return Err(anyhow!("unknown command '{other}'")),
        };

        Ok(Some(command))
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_case_insensitively() {
        assert_eq!(OperatorCommand::parse("LIST").unwrap(), Some(OperatorCommand::List));
        assert_eq!(OperatorCommand::parse("  list ").unwrap(), Some(OperatorCommand::List));
        assert_eq!(
            OperatorCommand::parse("Register").unwrap(),
            Some(OperatorCommand::Register)
        );
    }

    #[test]
    fn send_keeps_the_rest_of_the_line() {
        assert_eq!(
            OperatorCommand::parse("SEND Bob  hello there,  Bob ").unwrap(),
            Some(OperatorCommand::Send {
                destination: "Bob".into(),
                message: "hello there,  Bob".into(),
            })
        );
    }

    #[test]
    fn send_needs_destination_and_message() {
        assert!(OperatorCommand::parse("SEND").is_err());
        assert!(OperatorCommand::parse("SEND Bob").is_err());
        assert!(OperatorCommand::parse("SEND Bob   ").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(OperatorCommand::parse("   ").unwrap(), None);
        let err = OperatorCommand::parse("WHO").unwrap_err();
        assert!(err.to_string().contains("WHO"));
    }
}
