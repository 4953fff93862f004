//! Turn state machine.
//!
//! A turn always walks every phase once, in this order:
//!
//! 1. **EconomicDrift** -- every region drifts its factors and recomputes costs.
//! 2. **WageSettlement** -- the player (and competitors when configured) pays
//!    wages per region; an unpaid region loses all of that agent's workers and
//!    produces nothing for it this turn.
//! 3. **Harvest** -- the player's workers harvest raw material.
//! 4. **Packing** -- the player's workers pack raw material.
//! 5. **RandomEvent** -- at most one event from [`crate::events`].
//! 6. **CompetitorTurn** -- each competitor runs its policy.
//! 7. **MarketRepricing** -- global pressure is recomputed and regions repriced.
//! 8. **Evaluation** -- market shares and the win/lose outcome.

use std::collections::BTreeSet;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{AgentId, RegionId};
use sim_econ::{compute_supply_demand, drift_region, harvest, pack, reprice_regions};
use tracing::{debug, warn};

use crate::events::{self, EventKind};
use crate::{SimError, SimulationState};

/// One step of the turn pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    EconomicDrift,
    WageSettlement,
    Harvest,
    Packing,
    RandomEvent,
    CompetitorTurn,
    MarketRepricing,
    Evaluation,
}

impl TurnPhase {
    pub const FIRST: TurnPhase = TurnPhase::EconomicDrift;

    /// The phase after this one, or `None` once the turn is complete.
    pub fn next(self) -> Option<TurnPhase> {
        match self {
            TurnPhase::EconomicDrift => Some(TurnPhase::WageSettlement),
            TurnPhase::WageSettlement => Some(TurnPhase::Harvest),
            TurnPhase::Harvest => Some(TurnPhase::Packing),
            TurnPhase::Packing => Some(TurnPhase::RandomEvent),
            TurnPhase::RandomEvent => Some(TurnPhase::CompetitorTurn),
            TurnPhase::CompetitorTurn => Some(TurnPhase::MarketRepricing),
            TurnPhase::MarketRepricing => Some(TurnPhase::Evaluation),
            TurnPhase::Evaluation => None,
        }
    }
}

/// Where the game stands after an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    InProgress,
    PlayerWon,
    /// The player's balance reached zero.
    PlayerBankrupt,
    CompetitorWon(AgentId),
}

impl Outcome {
    pub fn is_over(self) -> bool {
        self != Outcome::InProgress
    }
}

/// Scratch state carried between the phases of a single turn.
#[derive(Debug, Default)]
pub(crate) struct TurnContext {
    pub(crate) messages: Vec<String>,
    pub(crate) event: Option<EventKind>,
    unpaid: BTreeSet<(AgentId, RegionId)>,
}

/// Run every phase of one turn against `state`.
pub(crate) fn run_turn<R: Rng + ?Sized>(
    state: &mut SimulationState,
    rng: &mut R,
) -> Result<TurnContext, SimError> {
    let mut ctx = TurnContext::default();
    let mut phase = Some(TurnPhase::FIRST);
    while let Some(current) = phase {
        debug!(?current, turn = state.turn, "phase");
        run_phase(current, state, &mut ctx, rng)?;
        phase = current.next();
    }
    Ok(ctx)
}

pub(crate) fn run_phase<R: Rng + ?Sized>(
    phase: TurnPhase,
    state: &mut SimulationState,
    ctx: &mut TurnContext,
    rng: &mut R,
) -> Result<(), SimError> {
    match phase {
        TurnPhase::EconomicDrift => {
            for region in state.regions.iter_mut() {
                drift_region(region, rng)?;
            }
        }
        TurnPhase::WageSettlement => settle_wages(state, ctx),
        TurnPhase::Harvest => {
            let player = &mut state.player;
            for region in &state.regions {
                if ctx.unpaid.contains(&(player.id, region.id)) {
                    continue;
                }
                let raw = harvest(region.workers_of(player.id), player.equipment_multiplier);
                player.raw_material = player.raw_material.saturating_add(raw);
            }
        }
        TurnPhase::Packing => {
            let player = &mut state.player;
            for region in &state.regions {
                if ctx.unpaid.contains(&(player.id, region.id)) {
                    continue;
                }
                let capacity = pack(region.workers_of(player.id), player.raw_material, player.equipment_multiplier);
                player.pack(capacity);
            }
        }
        TurnPhase::RandomEvent => {
            if let Some(kind) = events::roll(rng, state.config.event_chance) {
                ctx.event = Some(kind);
                let messages = events::apply(kind, state, rng)?;
                ctx.messages.extend(messages);
            }
        }
        TurnPhase::CompetitorTurn => {
            let ratio = state.config.competitor_hire_ratio;
            for competitor in state.competitors.iter_mut() {
                sim_ai::run_competitor_turn(competitor, &mut state.regions, ratio, rng)?;
            }
        }
        TurnPhase::MarketRepricing => {
            let market = compute_supply_demand(
                state.agents().map(|a| a.processed),
                state.config.market_demand,
            );
            reprice_regions(&mut state.regions, &market, rng)?;
            state.market = market;
        }
        TurnPhase::Evaluation => {
            state.outcome = evaluate(state);
            if let Some(line) = outcome_message(state) {
                ctx.messages.push(line);
            }
        }
    }
    Ok(())
}

fn settle_wages(state: &mut SimulationState, ctx: &mut TurnContext) {
    let include_competitors = state.config.competitor_wages;
    for region in state.regions.iter_mut() {
        let payers = std::iter::once(&mut state.player).chain(
            state
                .competitors
                .iter_mut()
                .filter(|_| include_competitors)
                .map(|c| &mut c.agent),
        );
        for agent in payers {
            let bill = region.wage_bill(agent.id);
            if agent.pay_wages(bill) {
                continue;
            }
            let gone = region.dismiss_all(agent.id);
            ctx.unpaid.insert((agent.id, region.id));
            warn!(agent = %agent.name, region = %region.name, %bill, gone, "wages unpaid, workers dismissed");
            ctx.messages.push(format!(
                "{} could not pay wages in {}! {} workers quit.",
                agent.name, region.name, gone
            ));
        }
    }
}

/// Recompute every agent's market share and decide the outcome.
///
/// The player can only win from `win_min_turn` on; bankruptcy and competitor
/// wins are checked every turn, and a competitor win takes precedence over
/// bankruptcy.
pub(crate) fn evaluate(state: &mut SimulationState) -> Outcome {
    let total: u64 = state.agents().map(|a| a.processed).sum();
    let share = |processed: u64| {
        if total == 0 {
            0.0
        } else {
            processed as f64 / total as f64
        }
    };
    for agent in state.agents_mut() {
        agent.market_share = share(agent.processed);
    }

    let cfg = &state.config;
    let player = &state.player;
    let player_qualifies =
        player.balance >= cfg.target_money || player.market_share >= cfg.monopoly_threshold;
    if state.turn >= cfg.win_min_turn && player_qualifies {
        return Outcome::PlayerWon;
    }

    let mut outcome = Outcome::InProgress;
    if player.balance <= Decimal::ZERO {
        outcome = Outcome::PlayerBankrupt;
    }
    for competitor in &state.competitors {
        let agent = &competitor.agent;
        if agent.balance >= cfg.target_money || agent.market_share >= cfg.monopoly_threshold {
            outcome = Outcome::CompetitorWon(agent.id);
        }
    }
    outcome
}

fn outcome_message(state: &SimulationState) -> Option<String> {
    match state.outcome {
        Outcome::InProgress => None,
        Outcome::PlayerWon => Some(format!("{} won the game!", state.player.name)),
        Outcome::PlayerBankrupt => Some("Game over! The player went bankrupt.".to_string()),
        Outcome::CompetitorWon(id) => {
            let name = state.agent(id).map(|a| a.name.as_str()).unwrap_or("A competitor");
            Some(format!("Game over! Winner: {name}!"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture_state;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn phases_run_in_fixed_order() {
        let mut order = vec![TurnPhase::FIRST];
        while let Some(next) = order.last().and_then(|p| p.next()) {
            order.push(next);
        }
        assert_eq!(
            order,
            vec![
                TurnPhase::EconomicDrift,
                TurnPhase::WageSettlement,
                TurnPhase::Harvest,
                TurnPhase::Packing,
                TurnPhase::RandomEvent,
                TurnPhase::CompetitorTurn,
                TurnPhase::MarketRepricing,
                TurnPhase::Evaluation,
            ]
        );
    }

    #[test]
    fn unpaid_wages_dismiss_workers() {
        let mut state = fixture_state();
        state.player.balance = Decimal::new(100, 0);
        state.regions[0].adjust_workers(AgentId::Player, 1);
        let mut ctx = TurnContext::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        run_phase(TurnPhase::WageSettlement, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.player.balance, Decimal::ZERO);
        assert_eq!(state.regions[0].workers_of(AgentId::Player), 0);
        assert_eq!(ctx.messages.len(), 1);

        state.player.raw_material = 40;
        run_phase(TurnPhase::Harvest, &mut state, &mut ctx, &mut rng).unwrap();
        run_phase(TurnPhase::Packing, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.player.raw_material, 40);
        assert_eq!(state.player.processed, 0);
    }

    #[test]
    fn paid_wages_then_produce() {
        let mut state = fixture_state();
        state.regions[0].adjust_workers(AgentId::Player, 2);
        let mut ctx = TurnContext::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        run_phase(TurnPhase::WageSettlement, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.player.balance, Decimal::new(4_500, 0));
        run_phase(TurnPhase::Harvest, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.player.raw_material, 200);
        run_phase(TurnPhase::Packing, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.player.processed, 150);
        assert_eq!(state.player.raw_material, 50);
    }

    #[test]
    fn competitors_skip_wages_by_default() {
        let mut state = fixture_state();
        state.regions[0].adjust_workers(AgentId::Competitor(0), 3);
        let before = state.competitors[0].agent.balance;
        let mut ctx = TurnContext::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        run_phase(TurnPhase::WageSettlement, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.competitors[0].agent.balance, before);

        state.config.competitor_wages = true;
        run_phase(TurnPhase::WageSettlement, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.competitors[0].agent.balance, before - Decimal::new(750, 0));
    }

    #[test]
    fn player_cannot_win_before_min_turn() {
        let mut state = fixture_state();
        state.turn = 3;
        state.player.balance = Decimal::new(600_000, 0);
        state.player.processed = 1_000;
        assert_eq!(evaluate(&mut state), Outcome::InProgress);
        assert!((state.player.market_share - 1.0).abs() < 1e-12);

        state.turn = 7;
        assert_eq!(evaluate(&mut state), Outcome::PlayerWon);
    }

    #[test]
    fn competitor_can_win_before_min_turn() {
        let mut state = fixture_state();
        state.turn = 2;
        state.competitors[0].agent.balance = Decimal::new(600_000, 0);
        assert_eq!(evaluate(&mut state), Outcome::CompetitorWon(AgentId::Competitor(0)));
    }

    #[test]
    fn competitor_wins_by_market_share() {
        let mut state = fixture_state();
        state.turn = 1;
        state.player.processed = 100;
        state.competitors[0].agent.processed = 900;
        assert_eq!(evaluate(&mut state), Outcome::CompetitorWon(AgentId::Competitor(0)));
    }

    #[test]
    fn bankrupt_player_loses() {
        let mut state = fixture_state();
        state.turn = 9;
        state.player.balance = Decimal::ZERO;
        assert_eq!(evaluate(&mut state), Outcome::PlayerBankrupt);
    }

    #[test]
    fn empty_market_has_zero_shares() {
        let mut state = fixture_state();
        state.turn = 10;
        assert_eq!(evaluate(&mut state), Outcome::InProgress);
        assert_eq!(state.player.market_share, 0.0);
        assert_eq!(state.competitors[0].agent.market_share, 0.0);
    }

    #[test]
    fn repricing_uses_processed_supply() {
        let mut state = fixture_state();
        state.player.processed = 40_000;
        state.competitors[0].agent.processed = 10_000;
        let mut ctx = TurnContext::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        run_phase(TurnPhase::MarketRepricing, &mut state, &mut ctx, &mut rng).unwrap();
        assert_eq!(state.market.total_supply, 50_000);
        assert!((state.market.pressure - 2.0).abs() < 1e-12);
        let r = &state.regions[0];
        assert!(r.min_price <= r.current_price && r.current_price <= r.max_price);
    }
}
