//! DraftKings game-line integration.
//!
//! Fetches moneyline, spread, and total offerings and routes game-line
//! wagers. Placement runs in simulate mode by default; live placement
//! posts against the partner API with the bet uuid as the idempotent
//! client reference.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::SportsbookBroker;
use crate::normalize;
use crate::types::{
    Bet, MarketType, Offering, Outcome, PlacementResult, PlacementStatus, Sport, StakewiseError,
};

const DEFAULT_BASE_URL: &str = "https://api.draftkings.com/partner/v1";
const BROKER_NAME: &str = "draftkings";
const HTTP_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DkBetResponse {
    status: String,
    #[serde(default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DkResultRow {
    event_id: String,
    market: String,
    #[serde(default)]
    winner: Option<String>,
    reported_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DraftKingsClient {
    http: Client,
    api_key: Secret<String>,
    base_url: String,
    /// When set, placements are acknowledged locally without hitting
    /// the wire. Results and offerings still come from the API.
    simulate: bool,
}

impl DraftKingsClient {
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

    async fn get_json(&self, url: &str) -> Result<Value, StakewiseError> {
        debug!(%url, "DraftKings GET");
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| broker_err(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(broker_err(format!("API error {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| broker_err(format!("bad JSON: {e}")))
    }
}

fn broker_err(message: String) -> StakewiseError {
    StakewiseError::Broker {
        broker: BROKER_NAME.to_string(),
        message,
    }
}

#[async_trait]
impl SportsbookBroker for DraftKingsClient {
    async fn fetch_offerings(&self, sports: &[Sport]) -> Result<Vec<Offering>, StakewiseError> {
        let leagues: Vec<String> = sports.iter().map(|s| s.to_string()).collect();
        let url = format!(
            "{}/offerings?status=open&sports={}",
            self.base_url,
            leagues.join(",")
        );
        let payload = self.get_json(&url).await?;
        let mut offerings = normalize::normalize(&payload, BROKER_NAME)?;
        // The API filter is advisory; enforce the sport set locally too.
        offerings.retain(|o| sports.contains(&o.sport));
        info!(count = offerings.len(), "DraftKings offerings fetched");
        Ok(offerings)
    }

    async fn place_bet(&self, bet: &Bet) -> Result<PlacementResult, StakewiseError> {
        if self.simulate {
            let reference = format!("sim-dk-{}", bet.id.simple());
            info!(bet_id = %bet.id, stake = %bet.stake, %reference, "[SIMULATED] bet placed");
            return Ok(PlacementResult {
                status: PlacementStatus::Accepted,
                broker_ref: Some(reference),
            });
        }

        let legs: Vec<Value> = bet
            .candidate
            .legs
            .iter()
            .map(|l| {
                serde_json::json!({
                    "event_id": l.offering.event_id,
                    "market": l.offering.market.to_string(),
                    "selection": l.offering.selection,
                    "price": l.offering.decimal_odds,
                })
            })
            .collect();
        let body = serde_json::json!({
            "client_ref": bet.id,
            "stake": bet.stake,
            "legs": legs,
        });

        let url = format!("{}/bets", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| broker_err(format!("placement failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(bet_id = %bet.id, %status, "DraftKings rejected placement");
            return Ok(PlacementResult {
                status: PlacementStatus::Rejected,
                broker_ref: Some(text),
            });
        }

        let parsed: DkBetResponse = resp
            .json()
            .await
            .map_err(|e| broker_err(format!("bad placement response: {e}")))?;
        Ok(PlacementResult {
            status: match parsed.status.as_str() {
                "accepted" => PlacementStatus::Accepted,
                "pending" => PlacementStatus::Pending,
                _ => PlacementStatus::Rejected,
            },
            broker_ref: parsed.reference,
        })
    }

    async fn fetch_results(&self, event_ids: &[String]) -> Result<Vec<Outcome>, StakewiseError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/results?events={}", self.base_url, event_ids.join(","));
        let payload = self.get_json(&url).await?;

        let rows: Vec<DkResultRow> = serde_json::from_value(payload)
            .map_err(|e| broker_err(format!("bad results payload: {e}")))?;
        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let market = MarketType::from_str(&row.market)
                .map_err(|e| broker_err(format!("bad results payload: {e}")))?;
            outcomes.push(Outcome {
                event_id: row.event_id,
                market,
                winning_selection: row.winner,
                reported_at: row.reported_at,
            });
        }
        Ok(outcomes)
    }

    async fn check_bet_status(
        &self,
        bet_id: Uuid,
    ) -> Result<Option<PlacementResult>, StakewiseError> {
        if self.simulate {
            return Ok(Some(PlacementResult {
                status: PlacementStatus::Accepted,
                broker_ref: Some(format!("sim-dk-{}", bet_id.simple())),
            }));
        }

        let url = format!("{}/bets/{bet_id}", self.base_url);
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

        let parsed: DkBetResponse = resp
            .json()
            .await
            .map_err(|e| broker_err(format!("bad status response: {e}")))?;
        Ok(Some(PlacementResult {
            status: match parsed.status.as_str() {
                "accepted" => PlacementStatus::Accepted,
                "pending" => PlacementStatus::Pending,
                _ => PlacementStatus::Rejected,
            },
            broker_ref: parsed.reference,
        }))
    }

    fn supports(&self, market: MarketType) -> bool {
        matches!(
            market,
            MarketType::Moneyline | MarketType::Spread | MarketType::Total
        )
    }

    fn name(&self) -> &str {
        BROKER_NAME
    }
}
