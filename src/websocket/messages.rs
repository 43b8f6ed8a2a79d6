use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fyers::messages::DataType;

/// Server -> client envelope types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// One relayed market tick, payload passed through opaque
    DataUpdate {
        message: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// Subscription acknowledgment
    Subscribed {
        symbols: Vec<String>,
        data_type: DataType,
    },
    /// Unsubscription acknowledgment
    Unsubscribed {
        symbols: Vec<String>,
        data_type: DataType,
    },
    /// The upstream feed connection is gone
    ConnectionClosed { message: String },
    /// Error surfaced to the client
    Error { message: String },
}

impl ServerEnvelope {
    pub fn data_update(message: serde_json::Value) -> Self {
        ServerEnvelope::DataUpdate {
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEnvelope::Error {
            message: message.into(),
        }
    }
}

/// Client -> server command
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    Subscribe {
        symbols: Vec<String>,
        #[serde(default)]
        data_type: DataType,
    },
    Unsubscribe {
        symbols: Vec<String>,
        #[serde(default)]
        data_type: DataType,
    },
}

/// Outcome of parsing one client text frame
#[derive(Debug)]
pub enum ParsedCommand {
    Command(ClientCommand),
    /// Recognizable JSON with an action we do not handle; dropped without
    /// acknowledgment, matching the upstream web client's expectations
    UnknownAction(Option<String>),
    /// Unparseable frame or a known action with bad arguments
    Invalid(String),
}

/// Parse a client frame without failing on unknown actions
pub fn parse_client_command(text: &str) -> ParsedCommand {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return ParsedCommand::Invalid(e.to_string()),
    };

    match value.get("action").and_then(|a| a.as_str()) {
        Some("subscribe") | Some("unsubscribe") => match serde_json::from_value(value) {
            Ok(command) => ParsedCommand::Command(command),
            Err(e) => ParsedCommand::Invalid(e.to_string()),
        },
        other => ParsedCommand::UnknownAction(other.map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_update_envelope_shape() {
        let envelope = ServerEnvelope::data_update(serde_json::json!({"ltp": 612.35}));
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "data_update");
        assert_eq!(json["message"]["ltp"], 612.35);
        // ISO-8601 timestamp
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_subscribed_envelope_shape() {
        let envelope = ServerEnvelope::Subscribed {
            symbols: vec!["NSE:SBIN-EQ".to_string()],
            data_type: DataType::SymbolUpdate,
        };
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "subscribed");
        assert_eq!(json["symbols"][0], "NSE:SBIN-EQ");
        assert_eq!(json["data_type"], "SymbolUpdate");
    }

    #[test]
    fn test_subscribe_command_defaults_to_lightweight_kind() {
        let parsed =
            parse_client_command(r#"{"action":"subscribe","symbols":["NSE:TCS-EQ"]}"#);

        match parsed {
            ParsedCommand::Command(ClientCommand::Subscribe { symbols, data_type }) => {
                assert_eq!(symbols, vec!["NSE:TCS-EQ".to_string()]);
                assert_eq!(data_type, DataType::SymbolUpdate);
            }
            other => panic!("unexpected parse outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_not_an_error() {
        let parsed = parse_client_command(r#"{"action":"subscrbe","symbols":["X"]}"#);
        assert!(matches!(
            parsed,
            ParsedCommand::UnknownAction(Some(action)) if action == "subscrbe"
        ));
    }

    #[test]
    fn test_missing_symbols_is_invalid() {
        let parsed = parse_client_command(r#"{"action":"subscribe"}"#);
        assert!(matches!(parsed, ParsedCommand::Invalid(_)));
    }

    #[test]
    fn test_unparseable_frame_is_invalid() {
        let parsed = parse_client_command("not json at all");
        assert!(matches!(parsed, ParsedCommand::Invalid(_)));
    }
}
