//! RIO wire format
//!
//! Device lines look like `<tag><sep><payload>`, where the tag is `S` for a
//! command success, `E` for a command error and anything else (in practice
//! `N`) for an unsolicited notification. State-bearing payloads have the form
//! `S[3].name="Kitchen"` or `C[1].Z[2].volume="40"`.

use crate::error::{Result, RioError};
use crate::types::{EntityId, SourceId, ZoneId};
use std::fmt;

/// Appended to every command written to the socket
pub const COMMAND_TERMINATOR: &str = "\r";

/// Tag of a successful command response
pub const TAG_SUCCESS: char = 'S';

/// Tag of a failed command response
pub const TAG_ERROR: char = 'E';

/// A variable value carried by a device line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUpdate {
    pub entity: EntityId,
    /// Variable name as the device reported it (not case-folded)
    pub variable: String,
    pub value: String,
}

/// Classification of one device line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `E` line; the payload is the device's message
    Error(String),
    /// `S` line; completes the active command
    Success(Option<VariableUpdate>),
    /// Any other tag; informational only
    Notification {
        tag: char,
        update: Option<VariableUpdate>,
    },
}

impl Response {
    /// Whether this line completes the command awaiting a response
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Response::Notification { .. })
    }

    /// The state carried by this line, if any
    pub fn update(&self) -> Option<&VariableUpdate> {
        match self {
            Response::Error(_) => None,
            Response::Success(update) => update.as_ref(),
            Response::Notification { update, .. } => update.as_ref(),
        }
    }
}

/// Decode one line received from the device
///
/// Returns `None` for a blank line. A payload that does not match the
/// variable pattern is not an error; it yields a response without an update.
pub fn decode_line(line: &str) -> Option<Response> {
    let line = line.trim();
    let mut chars = line.char_indices();
    let (_, tag) = chars.next()?;
    // One separator character follows the tag
    let payload = match chars.next() {
        Some((idx, sep)) => &line[idx + sep.len_utf8()..],
        None => "",
    };

    if tag == TAG_ERROR {
        return Some(Response::Error(payload.to_string()));
    }

    let update = parse_update(payload);
    if tag == TAG_SUCCESS {
        Some(Response::Success(update))
    } else {
        Some(Response::Notification { tag, update })
    }
}

/// Parse `<address>.<variable>="<value>"`
fn parse_update(payload: &str) -> Option<VariableUpdate> {
    let (entity, rest) = parse_address(payload)?;
    let rest = rest.strip_prefix('.')?;
    let (variable, quoted) = rest.split_once("=\"")?;
    if variable.is_empty() || variable.chars().any(char::is_whitespace) {
        return None;
    }
    let end = quoted.rfind('"')?;

    Some(VariableUpdate {
        entity,
        variable: variable.to_string(),
        value: quoted[..end].to_string(),
    })
}

fn parse_address(s: &str) -> Option<(EntityId, &str)> {
    if let Some(rest) = s.strip_prefix("S[") {
        let (source, rest) = bracketed_number(rest)?;
        return Some((EntityId::Source(SourceId::new(source)), rest));
    }

    let rest = s.strip_prefix("C[")?;
    let (controller, rest) = bracketed_number(rest)?;
    let rest = rest.strip_prefix(".Z[")?;
    let (zone, rest) = bracketed_number(rest)?;
    Some((EntityId::Zone(ZoneId::with_controller(zone, controller)), rest))
}

/// Parse `<digits>]`, returning the number and the text after the bracket
fn bracketed_number(s: &str) -> Option<(u32, &str)> {
    let end = s.find(']')?;
    let digits = &s[..end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, &s[end + 1..]))
}

/// A command sent to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        entity: EntityId,
        variable: String,
    },
    Set {
        entity: EntityId,
        variable: String,
        value: String,
    },
    Watch {
        entity: EntityId,
        enabled: bool,
    },
    Event {
        entity: EntityId,
        name: String,
        args: Vec<String>,
    },
}

impl Command {
    pub fn get(entity: impl Into<EntityId>, variable: impl Into<String>) -> Self {
        Command::Get {
            entity: entity.into(),
            variable: variable.into(),
        }
    }

    pub fn set(
        entity: impl Into<EntityId>,
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Command::Set {
            entity: entity.into(),
            variable: variable.into(),
            value: value.into(),
        }
    }

    pub fn watch(entity: impl Into<EntityId>, enabled: bool) -> Self {
        Command::Watch {
            entity: entity.into(),
            enabled,
        }
    }

    pub fn event<I, A>(entity: impl Into<EntityId>, name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        Command::Event {
            entity: entity.into(),
            name: name.into(),
            args: args.into_iter().map(|a| a.to_string()).collect(),
        }
    }

    /// The entity this command addresses
    pub fn entity(&self) -> EntityId {
        match self {
            Command::Get { entity, .. }
            | Command::Set { entity, .. }
            | Command::Watch { entity, .. }
            | Command::Event { entity, .. } => *entity,
        }
    }

    /// Check that the command can be written without breaking the line format
    ///
    /// The protocol has no escaping, so quotes and line breaks cannot be sent.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Get { variable, .. } => check_token("variable", variable),
            Command::Set {
                variable, value, ..
            } => {
                check_token("variable", variable)?;
                check_text("value", value)
            }
            Command::Watch { .. } => Ok(()),
            Command::Event { name, args, .. } => {
                check_token("event name", name)?;
                args.iter().try_for_each(|arg| check_text("event argument", arg))
            }
        }
    }
}

fn check_token(what: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(RioError::InvalidArgument(format!("{} is empty", what)));
    }
    if token.chars().any(|c| c.is_whitespace() || c == '"' || c == '=') {
        return Err(RioError::InvalidArgument(format!(
            "{} {:?} contains whitespace, '=' or '\"'",
            what, token
        )));
    }
    Ok(())
}

fn check_text(what: &str, text: &str) -> Result<()> {
    if text.contains(['"', '\r', '\n']) {
        return Err(RioError::InvalidArgument(format!(
            "{} {:?} contains a quote or line break",
            what, text
        )));
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Get { entity, variable } => {
                write!(f, "GET {}.{}", entity.device_str(), variable)
            }
            Command::Set {
                entity,
                variable,
                value,
            } => write!(f, "SET {}.{}=\"{}\"", entity.device_str(), variable, value),
            Command::Watch { entity, enabled } => write!(
                f,
                "WATCH {} {}",
                entity.device_str(),
                if *enabled { "ON" } else { "OFF" }
            ),
            Command::Event { entity, name, args } => {
                write!(f, "EVENT {}!{}", entity.device_str(), name)?;
                if !args.is_empty() {
                    write!(f, " {}", args.join(" "))?;
                }
                Ok(())
            }
        }
    }
}
