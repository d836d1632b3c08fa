//! Command parser for the census channel.
//!
//! Grammar of a raw command:
//!
//! ```text
//! RESET            rebuild the store from a fresh census
//! ALL              list every group
//! FILTER|<name>    show one group
//! DEL|<name>       delete one group
//! ```
//!
//! `RESET` and `ALL` are matched with padded equality, so a trailing newline
//! from `echo` is accepted. The `FILTER`/`DEL` keyword before the first `|`
//! must match exactly. Everything after the first `|`, further `|` included,
//! is the name, truncated to the bounded name width.

use crate::name::{compare_padded, ProcessName};

const RESET: &[u8] = b"RESET";
const ALL: &[u8] = b"ALL";
const FILTER: &[u8] = b"FILTER";
const DEL: &[u8] = b"DEL";
const DELIMITER: u8 = b'|';

#[derive(Debug, Clone, Copy)]
pub enum Command {
    Reset,
    ListAll,
    Filter(ProcessName),
    Delete(ProcessName),
    /// Unrecognised input. Carries no name, even when the input had a `|`.
    Unknown,
}

impl Command {
    /// Whether executing the command changes the store.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Command::Reset | Command::Delete(_))
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Reset => "RESET",
            Command::ListAll => "ALL",
            Command::Filter(_) => "FILTER",
            Command::Delete(_) => "DEL",
            Command::Unknown => "UNKNOWN",
        }
    }
}

/// Parses a raw command.
pub fn parse_command(input: &[u8]) -> Command {
    let input = match input.iter().position(|&b| b == 0) {
        Some(end) => &input[..end],
        None => input,
    };

    if compare_padded(input, RESET).is_equal() {
        return Command::Reset;
    }
    if compare_padded(input, ALL).is_equal() {
        return Command::ListAll;
    }

    let Some(split) = input.iter().position(|&b| b == DELIMITER) else {
        return Command::Unknown;
    };
    let (keyword, rest) = (&input[..split], &input[split + 1..]);

    match keyword {
        FILTER => Command::Filter(ProcessName::new(rest)),
        DEL => Command::Delete(ProcessName::new(rest)),
        _ => Command::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_of(cmd: Command) -> String {
        match cmd {
            Command::Filter(n) | Command::Delete(n) => n.to_string(),
            other => panic!("expected a named command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_reset_and_all() {
        assert!(matches!(parse_command(b"RESET"), Command::Reset));
        assert!(matches!(parse_command(b"RESET\n"), Command::Reset));
        assert!(matches!(parse_command(b"ALL"), Command::ListAll));
        assert!(matches!(parse_command(b"ALL\0\0"), Command::ListAll));
    }

    #[test]
    fn test_parse_reset_is_not_a_prefix_match() {
        assert!(matches!(parse_command(b"RESETX"), Command::Unknown));
        assert!(matches!(parse_command(b"RES"), Command::Unknown));
        assert!(matches!(parse_command(b"all"), Command::Unknown));
    }

    #[test]
    fn test_parse_filter_and_delete() {
        let cmd = parse_command(b"FILTER|bash");
        assert!(matches!(cmd, Command::Filter(_)));
        assert_eq!(name_of(cmd), "bash");

        let cmd = parse_command(b"DEL|sshd");
        assert!(matches!(cmd, Command::Delete(_)));
        assert_eq!(name_of(cmd), "sshd");
    }

    #[test]
    fn test_parse_keyword_must_match_exactly() {
        assert!(matches!(parse_command(b"FILT|bash"), Command::Unknown));
        assert!(matches!(parse_command(b"FILTERS|bash"), Command::Unknown));
        assert!(matches!(parse_command(b"DELETE|bash"), Command::Unknown));
        assert!(matches!(parse_command(b"|bash"), Command::Unknown));
    }

    #[test]
    fn test_parse_only_first_delimiter_counts() {
        let cmd = parse_command(b"FILTER|a|b");
        assert_eq!(name_of(cmd), "a|b");
    }

    #[test]
    fn test_parse_truncates_name() {
        let cmd = parse_command(b"DEL|abcdefghijklmnopqrstuvwxyz");
        assert_eq!(name_of(cmd), "abcdefghijklmno");
    }

    #[test]
    fn test_parse_name_does_not_leak_previous_bytes() {
        let _ = parse_command(b"FILTER|longprocessname");
        let cmd = parse_command(b"FILTER|ab");
        match cmd {
            Command::Filter(n) => {
                assert_eq!(n.as_bytes(), b"ab");
                assert!(n.padded()[2..].iter().all(|&b| b == 0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_inputs() {
        assert!(matches!(parse_command(b"XYZZY"), Command::Unknown));
        assert!(matches!(parse_command(b""), Command::Unknown));
        assert!(matches!(parse_command(b"FILTER"), Command::Unknown));
    }

    #[test]
    fn test_is_mutating() {
        assert!(Command::Reset.is_mutating());
        assert!(Command::Delete("x".into()).is_mutating());
        assert!(!Command::ListAll.is_mutating());
        assert!(!Command::Filter("x".into()).is_mutating());
        assert!(!Command::Unknown.is_mutating());
    }
}
