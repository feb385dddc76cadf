//! The interactive command surface.
//!
//! Parsing is separate from execution so both can be tested without a
//! terminal. The binary feeds stdin lines through [`ConsoleCommand::parse`]
//! and prints whatever [`execute`] returns.

use crate::error::Result;
use crate::node::BroadcastNode;
use std::fmt::Write;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  put <key> <value>   write locally and broadcast
  get <key>           read from the local store
  clock               show the local vector clock
  peers               list known peers
  pending             count messages waiting on dependencies
  help                show this text
  quit                exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Put { key: String, value: String },
    Get { key: String },
    Clock,
    Peers,
    Pending,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command {0:?}, try 'help'")]
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one input line.
    ///
    /// The value of `put` is the rest of the line after the key, so it may
    /// contain spaces.
    pub fn parse(line: &str) -> std::result::Result<Self, ParseError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim_start()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "put" => {
                let (key, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(ParseError::Usage("put <key> <value>"))?;
                let value = value.trim_start();
                if value.is_empty() {
                    return Err(ParseError::Usage("put <key> <value>"));
                }
                Ok(Self::Put {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            "get" => {
                let mut words = rest.split_whitespace();
                match (words.next(), words.next()) {
                    (Some(key), None) => Ok(Self::Get {
                        key: key.to_string(),
                    }),
                    _ => Err(ParseError::Usage("get <key>")),
                }
            }
            "clock" => Ok(Self::Clock),
            "peers" => Ok(Self::Peers),
            "pending" => Ok(Self::Pending),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Run `command` against `node` and return the text to print.
pub async fn execute(node: &BroadcastNode, command: &ConsoleCommand) -> Result<String> {
    let output = match command {
        ConsoleCommand::Put { key, value } => {
            node.broadcast_put(key, value).await?;
            format!("ok {}", node.clock())
        }
        ConsoleCommand::Get { key } => match node.get(key) {
            Some(value) => format!("{} = {}", key, value),
            None => format!("{} not found", key),
        },
        ConsoleCommand::Clock => node.clock().to_string(),
        ConsoleCommand::Peers => {
            let peers = node.peers();
            if peers.is_empty() {
                "no known peers".to_string()
            } else {
                let mut out = String::new();
                for peer in peers {
                    let _ = writeln!(out, "  {}", peer);
                }
                out.trim_end().to_string()
            }
        }
        ConsoleCommand::Pending => format!("{} pending", node.pending_len()),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => "bye".to_string(),
    };
    Ok(output)
}
