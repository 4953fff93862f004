//! Random disruption events rolled once per turn.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{AgentId, RegionId};
use sim_econ::to_money;
use tracing::info;

use crate::{SimError, SimulationState};

/// The five equally likely event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Every agent loses 10-30% of processed inventory.
    Spoilage,
    /// The player loses half its workers in one region.
    LaborStrike,
    /// Every agent loses 20-60% of its balance.
    MarketCrash,
    /// Every regional price is scaled up by a shared 1.1-1.5 factor.
    DemandSpike,
    /// The player loses raw material in proportion to its workers in one region.
    PestOutbreak,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Spoilage,
        EventKind::LaborStrike,
        EventKind::MarketCrash,
        EventKind::DemandSpike,
        EventKind::PestOutbreak,
    ];
}

/// Bernoulli trial with probability `chance`, then a uniform pick of the kind.
pub fn roll<R: Rng + ?Sized>(rng: &mut R, chance: f64) -> Option<EventKind> {
    let trigger: f64 = rng.gen();
    if trigger >= chance {
        return None;
    }
    Some(EventKind::ALL[rng.gen_range(0..EventKind::ALL.len())])
}

/// Apply an event, drawing any region or magnitude it needs from `rng`.
pub fn apply<R: Rng + ?Sized>(
    kind: EventKind,
    state: &mut SimulationState,
    rng: &mut R,
) -> Result<Vec<String>, SimError> {
    info!(?kind, turn = state.turn, "random event");
    match kind {
        EventKind::Spoilage => Ok(spoilage(state, rng)),
        EventKind::LaborStrike => {
            let region = random_region(state, rng);
            Ok(vec![labor_strike_in(state, region)?])
        }
        EventKind::MarketCrash => market_crash(state, rng),
        EventKind::DemandSpike => demand_spike(state, rng),
        EventKind::PestOutbreak => {
            let region = random_region(state, rng);
            Ok(vec![pest_outbreak_in(state, region)?])
        }
    }
}

fn random_region<R: Rng + ?Sized>(state: &SimulationState, rng: &mut R) -> RegionId {
    RegionId(rng.gen_range(0..state.regions.len()))
}

fn spoilage<R: Rng + ?Sized>(state: &mut SimulationState, rng: &mut R) -> Vec<String> {
    let mut messages = Vec::new();
    for agent in state.agents_mut() {
        let fraction: f64 = rng.gen_range(0.1..=0.3);
        let loss = (agent.processed as f64 * fraction).floor() as u64;
        agent.processed = agent.processed.saturating_sub(loss);
        messages.push(format!("Spoilage: {} lost {} units of tea.", agent.name, loss));
    }
    messages
}

fn market_crash<R: Rng + ?Sized>(state: &mut SimulationState, rng: &mut R) -> Result<Vec<String>, SimError> {
    let mut messages = Vec::new();
    for agent in state.agents_mut() {
        let fraction = to_money(rng.gen_range(0.2..=0.6))?;
        let loss = (agent.balance * fraction).floor().min(agent.balance).max(Decimal::ZERO);
        agent.balance -= loss;
        messages.push(format!("Market crash: {} lost ${}.", agent.name, loss));
    }
    Ok(messages)
}

fn demand_spike<R: Rng + ?Sized>(state: &mut SimulationState, rng: &mut R) -> Result<Vec<String>, SimError> {
    let factor = to_money(rng.gen_range(1.1..=1.5))?;
    for region in state.regions.iter_mut() {
        region.current_price = region.clamp_price(region.current_price * factor);
    }
    Ok(vec![format!("Unexpected demand: prices rose by a factor of {}.", factor.round_dp(2))])
}

/// Strike in `region`: the player loses `floor(workers / 2)` workers there.
pub fn labor_strike_in(state: &mut SimulationState, region: RegionId) -> Result<String, SimError> {
    let r = state
        .regions
        .get_mut(region.0)
        .ok_or(SimError::UnknownRegion(region))?;
    let affected = r.workers_of(AgentId::Player) / 2;
    r.adjust_workers(AgentId::Player, -i64::from(affected));
    Ok(format!("Strike in {}! {} workers walked out.", r.name, affected))
}

/// Pests in `region` eat 30% of the player's worker count in raw material.
///
/// Raw inventory saturates at zero.
pub fn pest_outbreak_in(state: &mut SimulationState, region: RegionId) -> Result<String, SimError> {
    let r = state.regions.get(region.0).ok_or(SimError::UnknownRegion(region))?;
    let loss = u64::from(r.workers_of(AgentId::Player)) * 3 / 10;
    let eaten = loss.min(state.player.raw_material);
    state.player.raw_material -= eaten;
    Ok(format!("Pests in {} ate {} tea leaves.", r.name, eaten))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture_state;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn roll_respects_chance() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..100 {
            assert_eq!(roll(&mut rng, 0.0), None);
        }
        for _ in 0..100 {
            assert!(roll(&mut rng, 1.0).is_some());
        }
    }

    #[test]
    fn every_kind_is_reachable() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut seen = Vec::new();
        for _ in 0..500 {
            if let Some(k) = roll(&mut rng, 1.0) {
                if !seen.contains(&k) {
                    seen.push(k);
                }
            }
        }
        assert_eq!(seen.len(), EventKind::ALL.len());
    }

    #[test]
    fn pest_outbreak_decrements_raw() {
        let mut state = fixture_state();
        state.regions[0].adjust_workers(AgentId::Player, 10);
        state.player.raw_material = 50;
        pest_outbreak_in(&mut state, RegionId(0)).unwrap();
        assert_eq!(state.player.raw_material, 47);
    }

    #[test]
    fn pest_outbreak_clamps_raw_at_zero() {
        let mut state = fixture_state();
        state.regions[0].adjust_workers(AgentId::Player, 20);
        state.player.raw_material = 2;
        let msg = pest_outbreak_in(&mut state, RegionId(0)).unwrap();
        assert_eq!(state.player.raw_material, 0);
        assert!(msg.contains("ate 2"));
    }

    #[test]
    fn strike_removes_half_rounded_down() {
        let mut state = fixture_state();
        state.regions[0].adjust_workers(AgentId::Player, 5);
        state.regions[0].adjust_workers(AgentId::Competitor(0), 4);
        labor_strike_in(&mut state, RegionId(0)).unwrap();
        assert_eq!(state.regions[0].workers_of(AgentId::Player), 3);
        assert_eq!(state.regions[0].workers_of(AgentId::Competitor(0)), 4);
    }

    #[test]
    fn unknown_region_is_an_error() {
        let mut state = fixture_state();
        assert_eq!(
            labor_strike_in(&mut state, RegionId(9)),
            Err(SimError::UnknownRegion(RegionId(9)))
        );
    }

    #[test]
    fn spoilage_takes_ten_to_thirty_percent() {
        let mut state = fixture_state();
        state.player.processed = 1_000;
        state.competitors[0].agent.processed = 1_000;
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let msgs = apply(EventKind::Spoilage, &mut state, &mut rng).unwrap();
        assert_eq!(msgs.len(), 2);
        for p in [state.player.processed, state.competitors[0].agent.processed] {
            assert!((700..=900).contains(&p), "processed {p}");
        }
    }

    #[test]
    fn crash_keeps_balances_non_negative() {
        let mut state = fixture_state();
        let before = state.player.balance;
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        apply(EventKind::MarketCrash, &mut state, &mut rng).unwrap();
        assert!(state.player.balance >= before * Decimal::new(4, 1));
        assert!(state.player.balance <= before * Decimal::new(8, 1) + Decimal::ONE);
        assert!(state.competitors[0].agent.balance >= Decimal::ZERO);
    }

    #[test]
    fn spike_scales_every_region_by_one_factor() {
        let mut state = fixture_state();
        let spec = sim_core::RegionSpec {
            name: "India".into(),
            raw_material_cost: Decimal::new(10, 0),
            labor_cost: Decimal::new(300, 0),
            tax_rate: Decimal::new(12, 2),
            potential_yield: 600,
            icon: None,
        };
        let mut second = sim_core::Region::new(
            RegionId(1),
            &spec,
            sim_core::EconomicFactors::default(),
            spec.raw_material_cost,
            spec.labor_cost,
        );
        second.current_price = Decimal::new(60, 0);
        state.regions.push(second);
        let before: Vec<Decimal> = state.regions.iter().map(|r| r.current_price).collect();

        let mut rng = ChaCha8Rng::seed_from_u64(16);
        apply(EventKind::DemandSpike, &mut state, &mut rng).unwrap();
        let ratios: Vec<Decimal> = state
            .regions
            .iter()
            .zip(&before)
            .map(|(r, old)| r.current_price / *old)
            .collect();
        assert_eq!(ratios[0], ratios[1]);
        assert!(ratios[0] >= Decimal::new(11, 1) && ratios[0] <= Decimal::new(15, 1), "ratio {}", ratios[0]);
    }

    #[test]
    fn spike_stays_within_bounds() {
        let mut state = fixture_state();
        state.regions[0].current_price = state.regions[0].max_price;
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        apply(EventKind::DemandSpike, &mut state, &mut rng).unwrap();
        assert_eq!(state.regions[0].current_price, state.regions[0].max_price);
    }
}
