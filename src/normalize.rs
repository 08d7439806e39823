//! Offering normalization.
//!
//! Converts heterogeneous broker payloads into the canonical
//! [`Offering`] shape. Two payload families are understood: game-line
//! events (DraftKings and compatible books) and player-prop
//! projections (PrizePicks). Unknown *extra* fields are ignored for
//! forward compatibility; missing *required* fields are a
//! `MalformedPayload` error.
//!
//! Price normalization is bit-reproducible: the same raw odds always
//! produce the same implied probability (round-half-to-even at a fixed
//! precision, see `types::IMPLIED_PROB_DP`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tracing::debug;

use crate::types::{MarketType, Offering, Price, Sport, StakewiseError};

/// Stake bounds assumed when a payload does not carry explicit limits.
const DEFAULT_MIN_STAKE: Decimal = dec!(1);
const DEFAULT_MAX_STAKE: Decimal = dec!(500);

/// Convert one raw broker payload into canonical offerings.
///
/// `broker_id` selects the payload family: `"prizepicks"` payloads are
/// prop projections, everything else is parsed as a game-line event.
pub fn normalize(payload: &Value, broker_id: &str) -> Result<Vec<Offering>, StakewiseError> {
    let offerings = match broker_id {
        "prizepicks" => normalize_projection(payload, broker_id)?,
        _ => normalize_game_lines(payload, broker_id)?,
    };
    debug!(
        broker = broker_id,
        offerings = offerings.len(),
        "Payload normalized"
    );
    Ok(offerings)
}

// ---------------------------------------------------------------------------
// Game-line events
// ---------------------------------------------------------------------------

/// Shape:
/// ```json
/// {
///   "event_id": "NBA-20260225-BOS-NYK",
///   "sport": "NBA",
///   "commence_time": "2026-02-25T19:00:00Z",
///   "markets": [
///     { "type": "moneyline",
///       "outcomes": [ {"label": "BOS", "american": -150},
///                     {"label": "NYK", "american": 130} ] }
///   ]
/// }
/// ```
fn normalize_game_lines(payload: &Value, broker_id: &str) -> Result<Vec<Offering>, StakewiseError> {
    let event_id = required_str(payload, "event_id", broker_id)?;
    let sport = parse_sport(required_str(payload, "sport", broker_id)?, broker_id)?;
    let expires_at = parse_timestamp(required_str(payload, "commence_time", broker_id)?, broker_id)?;
    let markets = payload
        .get("markets")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(broker_id, "missing 'markets' array"))?;

    let (min_stake, max_stake) = stake_bounds(payload);

    let mut offerings = Vec::new();
    for market_obj in markets {
        let market: MarketType = required_str(market_obj, "type", broker_id)?
            .parse()
            .map_err(|e| malformed(broker_id, &format!("{e}")))?;
        let outcomes = market_obj
            .get("outcomes")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(broker_id, "market missing 'outcomes' array"))?;

        for outcome in outcomes {
            let label = required_str(outcome, "label", broker_id)?;
            let price = parse_price(outcome, broker_id)?;
            offerings.push(Offering::new(
                broker_id, sport, event_id, market, label, price, min_stake, max_stake, expires_at,
            )?);
        }
    }

    Ok(offerings)
}

// ---------------------------------------------------------------------------
// Prop projections
// ---------------------------------------------------------------------------

/// Shape:
/// ```json
/// { "projection_id": "PP-883412",
///   "sport": "NBA",
///   "player": "LeBron James",
///   "stat_type": "points",
///   "line": 25.5,
///   "payout_multiplier": 1.87,
///   "starts_at": "2026-02-25T19:00:00Z" }
/// ```
///
/// Each projection yields an over and an under offering at the same
/// multiplier, both belonging to one conflict group.
fn normalize_projection(payload: &Value, broker_id: &str) -> Result<Vec<Offering>, StakewiseError> {
    let projection_id = required_str(payload, "projection_id", broker_id)?;
    let sport = parse_sport(required_str(payload, "sport", broker_id)?, broker_id)?;
    let player = required_str(payload, "player", broker_id)?;
    let stat = required_str(payload, "stat_type", broker_id)?;
    let line = required_decimal(payload, "line", broker_id)?;
    let multiplier = required_decimal(payload, "payout_multiplier", broker_id)?;
    let expires_at = parse_timestamp(required_str(payload, "starts_at", broker_id)?, broker_id)?;

    let (min_stake, max_stake) = stake_bounds(payload);
    let price = Price::Decimal(multiplier);

    let mut offerings = Vec::with_capacity(2);
    for direction in ["over", "under"] {
        offerings.push(Offering::new(
            broker_id,
            sport,
            projection_id,
            MarketType::PlayerProp,
            &format!("{player}:{stat}:{direction}:{line}"),
            price,
            min_stake,
            max_stake,
            expires_at,
        )?);
    }
    Ok(offerings)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn malformed(broker: &str, message: &str) -> StakewiseError {
    StakewiseError::MalformedPayload {
        broker: broker.to_string(),
        message: message.to_string(),
    }
}

fn required_str<'a>(value: &'a Value, field: &str, broker: &str) -> Result<&'a str, StakewiseError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(broker, &format!("missing required field '{field}'")))
}

fn required_decimal(value: &Value, field: &str, broker: &str) -> Result<Decimal, StakewiseError> {
    let raw = value
        .get(field)
        .ok_or_else(|| malformed(broker, &format!("missing required field '{field}'")))?;
    // Accept both JSON numbers and numeric strings; parse via the
    // string form so the decimal representation is exact.
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(malformed(broker, &format!("field '{field}' is not numeric"))),
    };
    text.parse::<Decimal>()
        .map_err(|_| malformed(broker, &format!("field '{field}' is not a valid decimal: {text}")))
}

fn parse_sport(raw: &str, broker: &str) -> Result<Sport, StakewiseError> {
    raw.parse::<Sport>()
        .map_err(|e| malformed(broker, &format!("{e}")))
}

fn parse_timestamp(raw: &str, broker: &str) -> Result<DateTime<Utc>, StakewiseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| malformed(broker, &format!("invalid RFC3339 timestamp: {raw}")))
}

/// A price may be quoted as `"american": -150` or `"decimal": 1.91`.
fn parse_price(outcome: &Value, broker: &str) -> Result<Price, StakewiseError> {
    if let Some(a) = outcome.get("american").and_then(Value::as_i64) {
        return Ok(Price::American(a));
    }
    if outcome.get("decimal").is_some() {
        return Ok(Price::Decimal(required_decimal(outcome, "decimal", broker)?));
    }
    Err(malformed(broker, "outcome carries neither 'american' nor 'decimal' odds"))
}

fn stake_bounds(payload: &Value) -> (Decimal, Decimal) {
    let parse = |field: &str, default: Decimal| -> Decimal {
        payload
            .get(field)
            .and_then(|v| match v {
                Value::Number(n) => n.to_string().parse().ok(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(default)
    };
    (
        parse("min_stake", DEFAULT_MIN_STAKE),
        parse("max_stake", DEFAULT_MAX_STAKE),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
