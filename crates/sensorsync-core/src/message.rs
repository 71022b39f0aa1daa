//! Wire message codec
//!
//! Messages travel as ASCII lines of five `;`-separated fields:
//!
//! ```text
//! <nodeAddress>;<childAddress>;<messageType>;<subType>;<payload>
//! ```
//!
//! There is no escaping. A payload containing `;` is not representable; on
//! decode everything after the fourth separator is taken as payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Field separator on the wire
pub const FIELD_SEPARATOR: char = ';';

/// Number of fields in a wire message
pub const FIELD_COUNT: usize = 5;

/// Message type (third wire field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Presentation,
    SetVariable,
    RequestVariable,
    AckVariable,
    Internal,
    /// Numeric type this gateway has no handling for
    Unknown(u8),
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            MessageType::Presentation => 0,
            MessageType::SetVariable => 1,
            MessageType::RequestVariable => 2,
            MessageType::AckVariable => 3,
            MessageType::Internal => 4,
            MessageType::Unknown(code) => code,
        }
    }
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            0 => MessageType::Presentation,
            1 => MessageType::SetVariable,
            2 => MessageType::RequestVariable,
            3 => MessageType::AckVariable,
            4 => MessageType::Internal,
            other => MessageType::Unknown(other),
        }
    }
}

/// Internal command codes carried in the sub-type field of `Internal` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InternalCommand {
    BatteryLevel = 0,
    BatteryDate = 1,
    LastTrip = 2,
    Time = 3,
    Version = 4,
    RequestId = 5,
    InclusionMode = 6,
    RelayNode = 7,
    LastUpdate = 8,
    Ping = 9,
    PingAck = 10,
    LogMessage = 11,
    Children = 12,
    Unit = 13,
}

impl InternalCommand {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a command by its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        use InternalCommand::*;
        let cmd = match code {
            0 => BatteryLevel,
            1 => BatteryDate,
            2 => LastTrip,
            3 => Time,
            4 => Version,
            5 => RequestId,
            6 => InclusionMode,
            7 => RelayNode,
            8 => LastUpdate,
            9 => Ping,
            10 => PingAck,
            11 => LogMessage,
            12 => Children,
            13 => Unit,
            _ => return None,
        };
        Some(cmd)
    }
}

/// A decoded wire message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Radio address of the node
    pub node_address: u8,
    /// Sensor/actuator channel within the node
    pub child_address: u8,
    pub message_type: MessageType,
    /// Sensor type for data messages, command code for internal messages
    pub sub_type: u8,
    /// Raw payload, interpretation depends on `sub_type`
    pub payload: String,
}

impl Message {
    pub fn new(
        node_address: u8,
        child_address: u8,
        message_type: MessageType,
        sub_type: u8,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            node_address,
            child_address,
            message_type,
            sub_type,
            payload: payload.into(),
        }
    }

    /// Build an internal command addressed to a node/child pair
    pub fn internal(
        node_address: u8,
        child_address: u8,
        command: InternalCommand,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(
            node_address,
            child_address,
            MessageType::Internal,
            command.code(),
            payload,
        )
    }

    /// Internal command carried by this message, if it is an internal message
    /// with a known code
    pub fn internal_command(&self) -> Option<InternalCommand> {
        match self.message_type {
            MessageType::Internal => InternalCommand::from_code(self.sub_type),
            _ => None,
        }
    }
}

/// Decode a single wire line into a [`Message`]
///
/// One trailing line terminator (`\n` or `\r\n`) is stripped before splitting.
pub fn decode(line: &str) -> GatewayResult<Message> {
    let body = line
        .strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line);

    let fields: Vec<&str> = body.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
    if fields.len() < FIELD_COUNT {
        return Err(GatewayError::malformed(
            line,
            format!("expected {} fields, got {}", FIELD_COUNT, fields.len()),
        ));
    }

    let node_address = parse_field(line, fields[0], "node address")?;
    let child_address = parse_field(line, fields[1], "child address")?;
    let message_type: u8 = parse_field(line, fields[2], "message type")?;
    let sub_type = parse_field(line, fields[3], "sub type")?;

    Ok(Message {
        node_address,
        child_address,
        message_type: MessageType::from(message_type),
        sub_type,
        payload: fields[4].to_string(),
    })
}

/// Encode a [`Message`] into its wire form (without line terminator)
pub fn encode(message: &Message) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}{sep}{}",
        message.node_address,
        message.child_address,
        message.message_type.code(),
        message.sub_type,
        message.payload,
        sep = FIELD_SEPARATOR
    )
}

fn parse_field(line: &str, field: &str, name: &str) -> GatewayResult<u8> {
    field
        .trim()
        .parse::<u8>()
        .map_err(|_| GatewayError::malformed(line, format!("invalid {}: {:?}", name, field)))
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl FromStr for Message {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}
