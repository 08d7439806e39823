//! PrizePicks player-prop integration.
//!
//! Projections come in as over/under pairs on a player stat line and
//! normalize into `PlayerProp` offerings. Entries (PrizePicks' term
//! for placed slips) are simulated by default.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::SportsbookBroker;
use crate::normalize;
use crate::types::{
    Bet, MarketType, Offering, Outcome, PlacementResult, PlacementStatus, Sport, StakewiseError,
};

const DEFAULT_BASE_URL: &str = "https://api.prizepicks.com/partner/v1";
const BROKER_NAME: &str = "prizepicks";
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct EntryResponse {
    status: String,
    #[serde(default)]
    entry_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SettlementRow {
    projection_id: String,
    /// The settled side in selection format, absent when the
    /// projection was voided (DNP, line pulled).
    #[serde(default)]
    settled_selection: Option<String>,
    reported_at: DateTime<Utc>,
}

pub struct PrizePicksClient {
    http: Client,
    api_key: Secret<String>,
    base_url: String,
    simulate: bool,
}

impl PrizePicksClient {
    pub fn new(api_key: Secret<String>, simulate: bool) -> Result<Self, StakewiseError> {
        Self::with_base_url(api_key, simulate, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: Secret<String>,
        simulate: bool,
        base_url: &str,
    ) -> Result<Self, StakewiseError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("stakewise/0.1.0")
            .build()
            .map_err(|e| broker_err(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            simulate,
        })
    }
}

fn broker_err(message: String) -> StakewiseError {
    StakewiseError::Broker {
        broker: BROKER_NAME.to_string(),
        message,
    }
}

#[async_trait]
impl SportsbookBroker for PrizePicksClient {
    async fn fetch_offerings(&self, sports: &[Sport]) -> Result<Vec<Offering>, StakewiseError> {
        let leagues: Vec<String> = sports.iter().map(|s| s.to_string()).collect();
        let url = format!(
            "{}/projections?status=open&leagues={}",
            self.base_url,
            leagues.join(",")
        );
        debug!(%url, "PrizePicks GET");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| broker_err(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(broker_err(format!("API error {status}")));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| broker_err(format!("bad JSON: {e}")))?;

        let mut offerings = normalize::normalize(&payload, BROKER_NAME)?;
        offerings.retain(|o| sports.contains(&o.sport));
        info!(count = offerings.len(), "PrizePicks projections fetched");
        Ok(offerings)
    }

    async fn place_bet(&self, bet: &Bet) -> Result<PlacementResult, StakewiseError> {
        if self.simulate {
            let reference = format!("sim-pp-{}", bet.id.simple());
            info!(bet_id = %bet.id, stake = %bet.stake, %reference, "[SIMULATED] entry placed");
            return Ok(PlacementResult {
                status: PlacementStatus::Accepted,
                broker_ref: Some(reference),
            });
        }

        let picks: Vec<Value> = bet
            .candidate
            .legs
            .iter()
            .map(|l| {
                serde_json::json!({
                    "projection_id": l.offering.event_id,
                    "selection": l.offering.selection,
                })
            })
            .collect();
        let body = serde_json::json!({
            "client_ref": bet.id,
            "stake": bet.stake,
            "picks": picks,
        });

        let url = format!("{}/entries", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| broker_err(format!("placement failed: {e}")))?;

        if !resp.status().is_success() {
            warn!(bet_id = %bet.id, status = %resp.status(), "PrizePicks rejected entry");
            return Ok(PlacementResult {
                status: PlacementStatus::Rejected,
                broker_ref: None,
            });
        }
        let parsed: EntryResponse = resp
            .json()
            .await
            .map_err(|e| broker_err(format!("bad entry response: {e}")))?;
        Ok(PlacementResult {
            status: match parsed.status.as_str() {
                "accepted" => PlacementStatus::Accepted,
                "pending" => PlacementStatus::Pending,
                _ => PlacementStatus::Rejected,
            },
            broker_ref: parsed.entry_id,
        })
    }

    async fn fetch_results(&self, event_ids: &[String]) -> Result<Vec<Outcome>, StakewiseError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/settlements?projections={}",
            self.base_url,
            event_ids.join(",")
        );
        debug!(%url, "PrizePicks GET");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| broker_err(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(broker_err(format!("API error {status}")));
        }

        let rows: Vec<SettlementRow> = resp
            .json()
            .await
            .map_err(|e| broker_err(format!("bad settlements payload: {e}")))?;
        Ok(rows
            .into_iter()
            .map(|row| Outcome {
                event_id: row.projection_id,
                market: MarketType::PlayerProp,
                winning_selection: row.settled_selection,
                reported_at: row.reported_at,
            })
            .collect())
    }

    async fn check_bet_status(
        &self,
        bet_id: Uuid,
    ) -> Result<Option<PlacementResult>, StakewiseError> {
        if self.simulate {
            return Ok(Some(PlacementResult {
                status: PlacementStatus::Accepted,
                broker_ref: Some(format!("sim-pp-{}", bet_id.simple())),
            }));
        }

        let url = format!("{}/entries/{bet_id}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| broker_err(format!("status query failed: {e}")))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(broker_err(format!("status query error {status}")));
        }
        let parsed: EntryResponse = resp
            .json()
            .await
            .map_err(|e| broker_err(format!("bad status response: {e}")))?;
        Ok(Some(PlacementResult {
            status: match parsed.status.as_str() {
                "accepted" => PlacementStatus::Accepted,
                "pending" => PlacementStatus::Pending,
                _ => PlacementStatus::Rejected,
            },
            broker_ref: parsed.entry_id,
        }))
    }

    fn supports(&self, market: MarketType) -> bool {
        market == MarketType::PlayerProp
    }

    fn name(&self) -> &str {
        BROKER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_props_only() {
        let pp = PrizePicksClient::new(Secret::new("k".into()), true).unwrap();
        assert!(pp.supports(MarketType::PlayerProp));
        assert!(!pp.supports(MarketType::Moneyline));
        assert_eq!(pp.name(), "prizepicks");
    }
}
