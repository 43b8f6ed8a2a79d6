use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data kind requested for a symbol subscription
///
/// `SymbolUpdate` is the lightweight per-tick quote stream and the default;
/// `DepthUpdate` carries the full quote with market depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    #[serde(rename = "SymbolUpdate")]
    SymbolUpdate,
    #[serde(rename = "DepthUpdate")]
    DepthUpdate,
}

impl DataType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataType::SymbolUpdate => "SymbolUpdate",
            DataType::DepthUpdate => "DepthUpdate",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One symbol subscription: exchange-qualified ticker plus data kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    pub data_type: DataType,
}

impl SymbolSpec {
    pub fn new(symbol: String, data_type: DataType) -> Self {
        Self { symbol, data_type }
    }

    /// Lightweight subscription for a symbol
    pub fn lite(symbol: String) -> Self {
        Self::new(symbol, DataType::SymbolUpdate)
    }
}

/// Lifecycle events emitted by a feed connection, in feed order
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The data socket completed its handshake (emitted once per adapter)
    Opened,
    /// One market tick, payload opaque at this layer
    Message(serde_json::Value),
    /// Connection or stream failure
    Error(super::feed::FeedError),
    /// The connection is gone for good; no further events follow
    Closed,
}

/// Build a subscription control frame for the data socket
pub fn create_subscribe_frame(symbols: &[&str], data_type: DataType) -> String {
    control_frame("SUB", symbols, data_type)
}

/// Build an unsubscription control frame for the data socket
pub fn create_unsubscribe_frame(symbols: &[&str], data_type: DataType) -> String {
    control_frame("UNSUB", symbols, data_type)
}

fn control_frame(op: &str, symbols: &[&str], data_type: DataType) -> String {
    serde_json::json!({
        "T": op,
        "TLIST": symbols,
        "SUB_T": data_type.as_str(),
    })
    .to_string()
}

/// Build the control frames for a batch of specs, one frame per data kind
pub fn frames_for(specs: &[SymbolSpec], subscribe: bool) -> Vec<String> {
    let mut by_kind: HashMap<DataType, Vec<&str>> = HashMap::new();
    for spec in specs {
        by_kind
            .entry(spec.data_type)
            .or_default()
            .push(spec.symbol.as_str());
    }

    by_kind
        .into_iter()
        .map(|(data_type, symbols)| {
            if subscribe {
                create_subscribe_frame(&symbols, data_type)
            } else {
                create_unsubscribe_frame(&symbols, data_type)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = create_subscribe_frame(&["NSE:SBIN-EQ"], DataType::SymbolUpdate);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["T"], "SUB");
        assert_eq!(value["TLIST"][0], "NSE:SBIN-EQ");
        assert_eq!(value["SUB_T"], "SymbolUpdate");
    }

    #[test]
    fn test_unsubscribe_frame_shape() {
        let frame = create_unsubscribe_frame(&["NSE:SBIN-EQ"], DataType::DepthUpdate);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["T"], "UNSUB");
        assert_eq!(value["SUB_T"], "DepthUpdate");
    }

    #[test]
    fn test_frames_grouped_by_data_kind() {
        let specs = vec![
            SymbolSpec::lite("NSE:SBIN-EQ".to_string()),
            SymbolSpec::lite("NSE:TCS-EQ".to_string()),
            SymbolSpec::new("NSE:INFY-EQ".to_string(), DataType::DepthUpdate),
        ];

        let frames = frames_for(&specs, true);
        assert_eq!(frames.len(), 2);

        let lite_frame = frames
            .iter()
            .map(|f| serde_json::from_str::<serde_json::Value>(f).unwrap())
            .find(|v| v["SUB_T"] == "SymbolUpdate")
            .unwrap();
        assert_eq!(lite_frame["TLIST"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_data_type_serializes_exactly() {
        assert_eq!(
            serde_json::to_string(&DataType::SymbolUpdate).unwrap(),
            r#""SymbolUpdate""#
        );
        assert_eq!(
            serde_json::to_string(&DataType::DepthUpdate).unwrap(),
            r#""DepthUpdate""#
        );
    }
}
