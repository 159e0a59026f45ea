//! Payload types delivered over the update channel

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Generic status envelope for a running bot. The dashboard renders
/// `state` and the headline numbers; everything else rides in `metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub bot_id: String,
    /// Lifecycle state as reported by the backend (running, paused, ...)
    pub state: String,
    #[serde(default)]
    pub equity: Option<Decimal>,
    #[serde(default)]
    pub open_positions: Option<u32>,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Business events pushed alongside status updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    Trade(TradeFill),
    Position(PositionUpdate),
    Metric(MetricSample),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub bot_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(default)]
    pub pnl: Option<Decimal>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub bot_id: String,
    pub symbol: String,
    /// Signed position size; zero means the position was closed
    pub size: Decimal,
    pub entry_price: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub bot_id: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl<'de> serde::Deserialize<'de> for TradeSide {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            _ => Err(serde::de::Error::unknown_variant(&s, &["buy", "sell"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_payload_minimal() {
        let payload: StatusPayload =
            serde_json::from_str(r#"{"bot_id":"mom-7","state":"running"}"#).expect("parses");
        assert_eq!(payload.bot_id, "mom-7");
        assert_eq!(payload.state, "running");
        assert!(payload.equity.is_none());
        assert!(payload.updated_at.is_none());
    }

    #[test]
    fn test_trade_fill_roundtrip_side_case() {
        let fill: TradeFill = serde_json::from_str(
            r#"{"bot_id":"mom-7","symbol":"BTC-USD","side":"BUY","price":"61250.5","size":"0.25"}"#,
        )
        .expect("parses");
        assert_eq!(fill.side, TradeSide::Buy);
        assert_eq!(fill.price, dec!(61250.5));
        assert_eq!(fill.size, dec!(0.25));
    }

    #[test]
    fn test_trade_side_rejects_unknown() {
        let result: Result<TradeSide, _> = serde_json::from_str(r#""hold""#);
        assert!(result.is_err());
    }
}
