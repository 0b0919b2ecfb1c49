//! WebSocket frame types
//!
//! Outbound: `{"message":{"cmd":"ENTRY","data":{...}}}`, with an optional
//! `id` when the sender waits for a correlated reply.
//!
//! Inbound frames are JSON objects. The body is the `message` object when
//! present, otherwise the root. The command comes from `cmd` (or `type`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Commands the server pushes without being asked
pub const BACKGROUND_COMMANDS: &[&str] = &["BALANCE", "COINS", "CREDITS", "NOTIFICATION"];

/// WebSocket command name, always uppercase on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WsCommand {
    /// Game snapshot commit
    Entry,
    Heartbeat,
    Config,
    Pair,
    Balance,
    Other(String),
}

impl WsCommand {
    pub fn parse(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "ENTRY" => WsCommand::Entry,
            "HEARTBEAT" => WsCommand::Heartbeat,
            "CONFIG" => WsCommand::Config,
            "PAIR" => WsCommand::Pair,
            "BALANCE" => WsCommand::Balance,
            _ => WsCommand::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WsCommand::Entry => "ENTRY",
            WsCommand::Heartbeat => "HEARTBEAT",
            WsCommand::Config => "CONFIG",
            WsCommand::Pair => "PAIR",
            WsCommand::Balance => "BALANCE",
            WsCommand::Other(name) => name,
        }
    }

    pub fn is_background(&self) -> bool {
        BACKGROUND_COMMANDS.contains(&self.as_str())
    }
}

impl From<&str> for WsCommand {
    fn from(name: &str) -> Self {
        WsCommand::parse(name)
    }
}

impl fmt::Display for WsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: OutboundMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub cmd: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl OutboundFrame {
    pub fn new(command: &WsCommand, data: Value) -> Self {
        Self {
            message: OutboundMessage {
                cmd: command.as_str().to_string(),
                data,
                id: None,
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.message.id = Some(id.into());
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// How an inbound frame is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// Unsolicited server event
    Background,
    /// Reply to something we sent
    CommandResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: InboundKind,
    pub command: Option<WsCommand>,
    /// Correlation id echoed from an outbound request
    pub id: Option<String>,
    pub data: Value,
    /// The whole frame as received
    pub raw: Value,
}

impl InboundMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let raw: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        let body = match raw.get("message") {
            Some(inner) if inner.is_object() => inner,
            _ => &raw,
        };

        let command = body
            .get("cmd")
            .or_else(|| body.get("type"))
            .and_then(Value::as_str)
            .map(WsCommand::parse);

        let id = body.get("id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let flagged = body
            .get("background")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let kind = if flagged || command.as_ref().is_some_and(WsCommand::is_background) {
            InboundKind::Background
        } else {
            InboundKind::CommandResponse
        };

        let data = body.get("data").cloned().unwrap_or_else(|| body.clone());

        Self {
            kind,
            command,
            id,
            data,
            raw,
        }
    }
}
