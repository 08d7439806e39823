//! Shared types for the STAKEWISE engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that broker, strategy,
//! ledger, and engine modules can depend on them without circular
//! references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Decimal places used when normalizing a price to an implied
/// probability. Combined with round-half-to-even this makes the
/// conversion bit-reproducible across brokers.
pub const IMPLIED_PROB_DP: u32 = 6;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Sports the engine knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sport {
    Nfl,
    Nba,
    Nhl,
    Mlb,
    Ncaafb,
    Ncaamb,
    Mma,
    Golf,
    Soccer,
}

impl Sport {
    /// All known sports (useful for iteration).
    pub const ALL: &'static [Sport] = &[
        Sport::Nfl,
        Sport::Nba,
        Sport::Nhl,
        Sport::Mlb,
        Sport::Ncaafb,
        Sport::Ncaamb,
        Sport::Mma,
        Sport::Golf,
        Sport::Soccer,
    ];

    /// Sports traded through game lines (spreads / totals / moneylines)
    /// rather than player props. Used for broker routing.
    pub fn is_game_line_sport(&self) -> bool {
        matches!(
            self,
            Sport::Nfl | Sport::Nba | Sport::Nhl | Sport::Mlb | Sport::Ncaafb | Sport::Ncaamb
        )
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sport::Nfl => "NFL",
            Sport::Nba => "NBA",
            Sport::Nhl => "NHL",
            Sport::Mlb => "MLB",
            Sport::Ncaafb => "NCAAFB",
            Sport::Ncaamb => "NCAAMB",
            Sport::Mma => "MMA",
            Sport::Golf => "GOLF",
            Sport::Soccer => "SOCCER",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Sport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NFL" => Ok(Sport::Nfl),
            "NBA" => Ok(Sport::Nba),
            "NHL" => Ok(Sport::Nhl),
            "MLB" => Ok(Sport::Mlb),
            "NCAAFB" => Ok(Sport::Ncaafb),
            "NCAAMB" => Ok(Sport::Ncaamb),
            "MMA" => Ok(Sport::Mma),
            "GOLF" => Ok(Sport::Golf),
            "SOCCER" => Ok(Sport::Soccer),
            _ => Err(anyhow::anyhow!("Unknown sport: {s}")),
        }
    }
}

/// Bet market classification. Offerings on the same event and market
/// type are mutually exclusive (one conflict group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    Moneyline,
    Spread,
    Total,
    PlayerProp,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Moneyline => write!(f, "moneyline"),
            MarketType::Spread => write!(f, "spread"),
            MarketType::Total => write!(f, "total"),
            MarketType::PlayerProp => write!(f, "player_prop"),
        }
    }
}

impl std::str::FromStr for MarketType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "moneyline" | "ml" | "h2h" => Ok(MarketType::Moneyline),
            "spread" | "spreads" | "handicap" => Ok(MarketType::Spread),
            "total" | "totals" | "over_under" => Ok(MarketType::Total),
            "player_prop" | "prop" | "props" => Ok(MarketType::PlayerProp),
            _ => Err(anyhow::anyhow!("Unknown market type: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// A quoted price in either of the two representations brokers use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Price {
    /// European decimal odds (payout multiplier per unit stake, > 1).
    Decimal(Decimal),
    /// American odds (+150, -110, ...). |value| >= 100.
    American(i64),
}

impl Price {
    /// Convert to decimal odds (the payout multiplier per unit staked).
    ///
    /// American conversion: +A -> 1 + A/100, -A -> 1 + 100/|A|.
    pub fn decimal_odds(&self) -> Result<Decimal, StakewiseError> {
        match self {
            Price::Decimal(d) => {
                if *d > Decimal::ONE {
                    Ok(*d)
                } else {
                    Err(StakewiseError::MalformedPayload {
                        broker: String::new(),
                        message: format!("decimal odds must exceed 1.0, got {d}"),
                    })
                }
            }
            Price::American(a) => {
                if *a >= 100 {
                    Ok(Decimal::ONE + Decimal::from(*a) / dec!(100))
                } else if *a <= -100 {
                    Ok(Decimal::ONE + dec!(100) / Decimal::from(-*a))
                } else {
                    Err(StakewiseError::MalformedPayload {
                        broker: String::new(),
                        message: format!("american odds must have |value| >= 100, got {a}"),
                    })
                }
            }
        }
    }

    /// Market-implied win probability: 1 / decimal_odds, rounded
    /// half-to-even at [`IMPLIED_PROB_DP`] places. Two brokers quoting
    /// mathematically equal odds always yield the identical value.
    pub fn implied_probability(&self) -> Result<Decimal, StakewiseError> {
        let odds = self.decimal_odds()?;
        Ok((Decimal::ONE / odds)
            .round_dp_with_strategy(IMPLIED_PROB_DP, RoundingStrategy::MidpointNearestEven))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Decimal(d) => write!(f, "{d}"),
            Price::American(a) if *a > 0 => write!(f, "+{a}"),
            Price::American(a) => write!(f, "{a}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Offering
// ---------------------------------------------------------------------------

/// One bettable proposition at a quoted price, as captured from a
/// broker at a point in time. Immutable once captured; a fresh fetch
/// produces a fresh Offering even for the same underlying market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    /// Stable identifier: broker/event/market/selection.
    pub id: String,
    pub broker: String,
    pub sport: Sport,
    pub event_id: String,
    pub market: MarketType,
    pub selection: String,
    pub price: Price,
    /// Decimal odds derived from `price` at capture time.
    pub decimal_odds: Decimal,
    /// Implied probability derived from `price` at capture time.
    pub implied_probability: Decimal,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    pub observed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Offering {
    /// Capture an offering, normalizing the price. Fails when the price
    /// is not representable as valid odds.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: &str,
        sport: Sport,
        event_id: &str,
        market: MarketType,
        selection: &str,
        price: Price,
        min_stake: Decimal,
        max_stake: Decimal,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, StakewiseError> {
        let decimal_odds = price.decimal_odds()?;
        let implied_probability = price.implied_probability()?;
        Ok(Self {
            id: format!("{broker}:{event_id}:{market}:{selection}"),
            broker: broker.to_string(),
            sport,
            event_id: event_id.to_string(),
            market,
            selection: selection.to_string(),
            price,
            decimal_odds,
            implied_probability,
            min_stake,
            max_stake,
            observed_at: Utc::now(),
            expires_at,
        })
    }

    /// Offerings with the same conflict key are mutually exclusive:
    /// at most one may appear in any bet, and no two selected bets may
    /// both carry a leg from the same group.
    pub fn conflict_key(&self) -> (String, MarketType) {
        (self.event_id.clone(), self.market)
    }

    /// Whether the offering can still be bet on.
    pub fn is_active(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

impl fmt::Display for Offering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} @ {} (p={:.4})",
            self.broker,
            self.sport,
            self.event_id,
            self.market,
            self.selection,
            self.price,
            self.implied_probability,
        )
    }
}

// ---------------------------------------------------------------------------
// Edge estimate
// ---------------------------------------------------------------------------

/// An offering scored against an externally modeled win probability.
/// Recomputed each cycle; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeEstimate {
    pub offering: Offering,
    pub modeled_probability: Decimal,
    pub implied_probability: Decimal,
    /// modeled - implied. Positive means the market underprices the win.
    pub edge: Decimal,
    /// Expected profit per unit staked at the offered price.
    pub ev_per_unit: Decimal,
}

impl fmt::Display for EdgeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | model={:.4} implied={:.4} edge={:+.4} ev/unit={:+.4}",
            self.offering.id,
            self.modeled_probability,
            self.implied_probability,
            self.edge,
            self.ev_per_unit,
        )
    }
}

// ---------------------------------------------------------------------------
// Parlay candidate
// ---------------------------------------------------------------------------

/// A proposed wager: one offering (single) or several legs combined
/// into a parlay. Legs are broker-compatible, conflict-group-disjoint,
/// and from distinct events (there is no correlation model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayCandidate {
    pub legs: Vec<EdgeEstimate>,
    /// Product of leg modeled probabilities (independence assumption).
    pub combined_probability: Decimal,
    /// Product of leg decimal odds.
    pub combined_price: Decimal,
    pub stake: Decimal,
    /// Expected profit at `stake`.
    pub expected_value: Decimal,
}

impl ParlayCandidate {
    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    pub fn is_single(&self) -> bool {
        self.legs.len() == 1
    }

    /// Broker the candidate must be placed with (all legs share it).
    pub fn broker(&self) -> &str {
        &self.legs[0].offering.broker
    }

    /// Expected profit per unit staked.
    pub fn ev_per_unit(&self) -> Decimal {
        self.combined_probability * (self.combined_price - Decimal::ONE)
            - (Decimal::ONE - self.combined_probability)
    }

    /// Deterministic identity: sorted leg offering ids joined. Used as
    /// the final tie-breaker in optimizer ranking.
    pub fn lexical_key(&self) -> String {
        let mut ids: Vec<&str> = self.legs.iter().map(|l| l.offering.id.as_str()).collect();
        ids.sort_unstable();
        ids.join("+")
    }
}

impl fmt::Display for ParlayCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-leg @ {:.3} | p={:.4} stake=${:.2} ev=${:.4}",
            self.leg_count(),
            self.combined_price,
            self.combined_probability,
            self.stake,
            self.expected_value,
        )
    }
}

// ---------------------------------------------------------------------------
// Bet and lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a bet. See `ledger` for the legal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetState {
    Proposed,
    Placed,
    Won,
    Lost,
    Pushed,
    Settled,
    Voided,
}

impl BetState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BetState::Settled | BetState::Voided)
    }

    /// States reached from a confirmed final result.
    pub fn is_resolved(&self) -> bool {
        matches!(self, BetState::Won | BetState::Lost | BetState::Pushed)
    }
}

impl fmt::Display for BetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BetState::Proposed => "proposed",
            BetState::Placed => "placed",
            BetState::Won => "won",
            BetState::Lost => "lost",
            BetState::Pushed => "pushed",
            BetState::Settled => "settled",
            BetState::Voided => "voided",
        };
        write!(f, "{s}")
    }
}

/// Final outcome of a resolved bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetOutcome {
    Won,
    Lost,
    Pushed,
}

impl From<BetOutcome> for BetState {
    fn from(o: BetOutcome) -> Self {
        match o {
            BetOutcome::Won => BetState::Won,
            BetOutcome::Lost => BetState::Lost,
            BetOutcome::Pushed => BetState::Pushed,
        }
    }
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetOutcome::Won => write!(f, "won"),
            BetOutcome::Lost => write!(f, "lost"),
            BetOutcome::Pushed => write!(f, "pushed"),
        }
    }
}

/// Lifecycle events accepted by the ledger state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BetEvent {
    /// Broker acknowledged placement. Idempotent on replay.
    PlacementConfirmed { broker_ref: String },
    /// Final confirmed result with the payout owed (gross return
    /// including the returned stake for wins and pushes).
    ResultConfirmed { outcome: BetOutcome, payout: Decimal },
    /// Payout/loss has been booked against the account.
    SettlementRecorded,
    /// Broker rejected the bet or the market was pulled.
    Voided { reason: String },
}

impl fmt::Display for BetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetEvent::PlacementConfirmed { broker_ref } => {
                write!(f, "placement_confirmed({broker_ref})")
            }
            BetEvent::ResultConfirmed { outcome, payout } => {
                write!(f, "result_confirmed({outcome}, ${payout:.2})")
            }
            BetEvent::SettlementRecorded => write!(f, "settlement_recorded"),
            BetEvent::Voided { reason } => write!(f, "voided({reason})"),
        }
    }
}

/// The durable, placed unit: a selected candidate with a committed
/// stake. Identity is immutable; state changes only via the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub candidate: ParlayCandidate,
    pub stake: Decimal,
    pub broker: String,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    pub fn from_candidate(candidate: ParlayCandidate) -> Self {
        let broker = candidate.broker().to_string();
        let stake = candidate.stake;
        Self {
            id: Uuid::new_v4(),
            candidate,
            stake,
            broker,
            created_at: Utc::now(),
        }
    }

    /// Event ids covered by the bet's legs.
    pub fn event_ids(&self) -> Vec<String> {
        self.candidate
            .legs
            .iter()
            .map(|l| l.offering.event_id.clone())
            .collect()
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bet {} [{}] {} stake=${:.2}",
            self.id, self.broker, self.candidate, self.stake,
        )
    }
}

// ---------------------------------------------------------------------------
// Broker interface payloads
// ---------------------------------------------------------------------------

/// Broker response to a placement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementResult {
    pub status: PlacementStatus,
    pub broker_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementStatus {
    Accepted,
    Rejected,
    /// Submitted but not yet confirmed broker-side. Used when an ack
    /// was lost and the order status must be queried before any retry.
    Pending,
}

impl fmt::Display for PlacementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementStatus::Accepted => write!(f, "accepted"),
            PlacementStatus::Rejected => write!(f, "rejected"),
            PlacementStatus::Pending => write!(f, "pending"),
        }
    }
}

/// A confirmed final result for one event market, as reported by a
/// broker's results feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub event_id: String,
    pub market: MarketType,
    /// The winning selection, or `None` when the market pushed/voided.
    pub winning_selection: Option<String>,
    pub reported_at: DateTime<Utc>,
}

impl Outcome {
    pub fn key(&self) -> (String, MarketType) {
        (self.event_id.clone(), self.market)
    }
}

// ---------------------------------------------------------------------------
// Account state
// ---------------------------------------------------------------------------

/// Persistent bankroll accounting, saved to disk after each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub bankroll: Decimal,
    pub total_pnl: Decimal,
    pub bets_placed: u64,
    pub bets_won: u64,
    pub bets_lost: u64,
    pub bets_pushed: u64,
    pub peak_bankroll: Decimal,
    pub start_time: DateTime<Utc>,
}

impl AccountState {
    pub fn new(initial_bankroll: Decimal) -> Self {
        Self {
            bankroll: initial_bankroll,
            total_pnl: Decimal::ZERO,
            bets_placed: 0,
            bets_won: 0,
            bets_lost: 0,
            bets_pushed: 0,
            peak_bankroll: initial_bankroll,
            start_time: Utc::now(),
        }
    }

    /// Win rate over resolved bets as a percentage. 0.0 if none resolved.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.bets_won + self.bets_lost;
        if resolved == 0 {
            0.0
        } else {
            self.bets_won as f64 / resolved as f64 * 100.0
        }
    }

    /// Current drawdown from peak as a fraction (0 = at peak).
    pub fn drawdown(&self) -> Decimal {
        if self.peak_bankroll <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            Decimal::ONE - self.bankroll / self.peak_bankroll
        }
    }

    pub fn update_peak(&mut self) {
        if self.bankroll > self.peak_bankroll {
            self.peak_bankroll = self.bankroll;
        }
    }

    /// Book a resolved bet. `payout` is the gross return (stake plus
    /// winnings for a win; the stake itself for a push; zero for a
    /// loss). The stake was deducted at commit time, so the realized
    /// pnl is `payout - stake`.
    pub fn record_settlement(&mut self, outcome: BetOutcome, stake: Decimal, payout: Decimal) {
        let pnl = payout - stake;
        self.bankroll += payout;
        self.total_pnl += pnl;
        match outcome {
            BetOutcome::Won => self.bets_won += 1,
            BetOutcome::Lost => self.bets_lost += 1,
            BetOutcome::Pushed => self.bets_pushed += 1,
        }
        self.update_peak();
    }

    /// Deduct a committed stake from the bankroll.
    pub fn commit_stake(&mut self, stake: Decimal) {
        self.bankroll -= stake;
        self.bets_placed += 1;
    }

    /// Return a stake whose bet was voided before settlement.
    pub fn release_stake(&mut self, stake: Decimal) {
        self.bankroll += stake;
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bankroll=${:.2} | pnl=${:+.2} | bets={} (W{}/L{}/P{}) | win_rate={:.1}%",
            self.bankroll,
            self.total_pnl,
            self.bets_placed,
            self.bets_won,
            self.bets_lost,
            self.bets_pushed,
            self.win_rate(),
        )
    }
}

// ---------------------------------------------------------------------------
// Cycle reports
// ---------------------------------------------------------------------------

/// Summary of one daily assessment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub day: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub offerings_fetched: usize,
    pub edges_found: usize,
    pub bets_proposed: usize,
    pub bets_placed: usize,
    pub bets_voided: usize,
    pub total_staked: Decimal,
    pub brokers_skipped: Vec<String>,
    /// True when the daily run for this date had already completed and
    /// the trigger was a no-op.
    pub already_ran: bool,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "daily {} | offerings={} edges={} proposed={} placed={} staked=${:.2} skipped={:?}{}",
            self.day,
            self.offerings_fetched,
            self.edges_found,
            self.bets_proposed,
            self.bets_placed,
            self.total_staked,
            self.brokers_skipped,
            if self.already_ran { " (already ran)" } else { "" },
        )
    }
}

/// Summary of one resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub timestamp: DateTime<Utc>,
    pub bets_checked: usize,
    pub transitions_applied: usize,
    pub bets_settled: usize,
    pub bets_deferred: usize,
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resolution | checked={} transitions={} settled={} deferred={}",
            self.bets_checked, self.transitions_applied, self.bets_settled, self.bets_deferred,
        )
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Domain-specific error types for STAKEWISE.
///
/// Per-offering and per-broker failures are absorbed locally by the
/// orchestrator; ledger-integrity failures always surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StakewiseError {
    #[error("Malformed payload from broker '{broker}': {message}")]
    MalformedPayload { broker: String, message: String },

    #[error("Invalid modeled probability {0} (must be strictly between 0 and 1)")]
    InvalidProbability(Decimal),

    #[error("Budget exhausted: remaining ${remaining:.2}")]
    BudgetExhausted { remaining: Decimal },

    #[error("Premature resolution: bet {0} is not in Placed state")]
    PrematureResolution(Uuid),

    #[error("Illegal transition for bet {bet_id}: {from} does not accept {event}")]
    IllegalTransition {
        bet_id: Uuid,
        from: BetState,
        event: String,
    },

    #[error("Unknown bet: {0}")]
    UnknownBet(Uuid),

    #[error("Ambiguous outcome for event '{event_id}' ({market}): conflicting or duplicate reports")]
    AmbiguousOutcome { event_id: String, market: MarketType },

    #[error("A {0} run is already in progress")]
    RunInProgress(&'static str),

    #[error("Broker error ({broker}): {message}")]
    Broker { broker: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
