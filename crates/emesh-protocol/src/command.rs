//! Application payload convention.
//!
//! Writes travel as `PUT:<key>:<value>`. The value may itself contain `:`,
//! so a payload is split into at most three fields. Anything else is an
//! unrecognized payload and is ignored by the apply step.

const PUT_TAG: &str = "PUT";
const SEPARATOR: char = ':';

/// A parsed application command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: String },
}

impl Command {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Serialize into a message payload.
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Command::Put { key, value } => {
                format!("{PUT_TAG}{SEPARATOR}{key}{SEPARATOR}{value}").into_bytes()
            }
        }
    }

    /// Parse a payload, returning `None` for anything unrecognized.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        let mut parts = text.splitn(3, SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(PUT_TAG), Some(key), Some(value)) => Some(Command::put(key, value)),
            _ => None,
        }
    }
}
