#![deny(warnings)]

//! Turn engine for the tea market simulation.
//!
//! [`Simulation`] owns the whole [`SimulationState`] plus a seeded RNG and is
//! the only entry point for a presentation layer: intents (`hire_worker`,
//! `buy_raw_material`, ...) mutate the state between turns, `advance_turn`
//! runs the fixed phase pipeline in [`turn`], and the query methods read the
//! state without touching it. Given the same seed and the same sequence of
//! intents two simulations end in identical states.

pub mod events;
pub mod turn;

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    validate_scenario, Agent, AgentId, Competitor, EconomicFactors, Region, RegionId, Scenario,
    SimConfig, ValidationError,
};
use sim_econ::{compute_supply_demand, reprice_regions, seed_region, to_money, EconError, MarketState};
use thiserror::Error;
use tracing::{debug, debug_span, info};

pub use events::EventKind;
pub use turn::{Outcome, TurnPhase};

/// Errors that indicate a defect in the calling sequence rather than a
/// gameplay failure.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("invalid scenario: {0}")]
    Validation(#[from] ValidationError),
    #[error("economic computation failed: {0}")]
    Econ(#[from] EconError),
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),
    #[error("unknown region: {0}")]
    UnknownRegion(RegionId),
    /// A post-turn invariant check failed.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Every record the engine mutates, passed explicitly to each phase.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationState {
    pub config: SimConfig,
    pub regions: Vec<Region>,
    pub player: Agent,
    pub competitors: Vec<Competitor>,
    /// Completed turns.
    pub turn: u32,
    /// Supply/demand figures from the last repricing.
    pub market: MarketState,
    pub outcome: Outcome,
}

impl SimulationState {
    /// Player first, then competitors in index order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> + '_ {
        std::iter::once(&self.player).chain(self.competitors.iter().map(|c| &c.agent))
    }

    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> + '_ {
        std::iter::once(&mut self.player).chain(self.competitors.iter_mut().map(|c| &mut c.agent))
    }

    pub fn agent(&self, id: AgentId) -> Result<&Agent, SimError> {
        match id {
            AgentId::Player => Ok(&self.player),
            AgentId::Competitor(i) => self
                .competitors
                .get(i)
                .map(|c| &c.agent)
                .ok_or(SimError::UnknownAgent(id)),
        }
    }

    pub fn region(&self, id: RegionId) -> Result<&Region, SimError> {
        self.regions.get(id.0).ok_or(SimError::UnknownRegion(id))
    }

    fn agent_and_region_mut(
        &mut self,
        agent: AgentId,
        region: RegionId,
    ) -> Result<(&mut Agent, &mut Region), SimError> {
        let region_ref = self
            .regions
            .get_mut(region.0)
            .ok_or(SimError::UnknownRegion(region))?;
        let agent_ref = match agent {
            AgentId::Player => &mut self.player,
            AgentId::Competitor(i) => {
                &mut self
                    .competitors
                    .get_mut(i)
                    .ok_or(SimError::UnknownAgent(agent))?
                    .agent
            }
        };
        Ok((agent_ref, region_ref))
    }

    fn hire_ratio(&self, agent: AgentId) -> Decimal {
        match agent {
            AgentId::Player => Decimal::ONE,
            AgentId::Competitor(_) => self.config.competitor_hire_ratio,
        }
    }

    /// Share of global processed inventory held by `id`, 0 when nobody holds any.
    pub fn market_share(&self, id: AgentId) -> Result<f64, SimError> {
        let own = self.agent(id)?.processed;
        let total: u64 = self.agents().map(|a| a.processed).sum();
        if total == 0 {
            return Ok(0.0);
        }
        Ok(own as f64 / total as f64)
    }

    /// Verify the invariants that must hold between turns.
    pub fn check_invariants(&self) -> Result<(), SimError> {
        for r in &self.regions {
            if r.min_price < Decimal::ZERO || r.min_price > r.max_price {
                return Err(SimError::Invariant(format!("{}: inverted price bounds", r.name)));
            }
            if r.current_price < r.min_price || r.current_price > r.max_price {
                return Err(SimError::Invariant(format!(
                    "{}: price {} outside [{}, {}]",
                    r.name, r.current_price, r.min_price, r.max_price
                )));
            }
            if r.labor_cost < Decimal::ZERO {
                return Err(SimError::Invariant(format!("{}: negative labor cost", r.name)));
            }
        }
        for a in self.agents() {
            if a.balance < Decimal::ZERO {
                return Err(SimError::Invariant(format!("{}: negative balance", a.name)));
            }
        }
        Ok(())
    }
}

/// Result of one `advance_turn` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub turn: u32,
    pub outcome: Outcome,
    pub event: Option<EventKind>,
    pub messages: Vec<String>,
}

/// Player progress toward the two win conditions, each as a fraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub money_fraction: f64,
    pub market_share: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionView {
    pub id: RegionId,
    pub name: String,
    pub raw_material_cost: Decimal,
    pub labor_cost: Decimal,
    pub tax_rate: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub current_price: Decimal,
    pub factors: EconomicFactors,
    pub workers: Vec<(AgentId, u32)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub name: String,
    pub balance: Decimal,
    pub raw_material: u64,
    pub processed: u64,
    pub equipment_multiplier: f64,
    pub market_share: f64,
    pub aggressive_factor: Option<f64>,
}

/// Serializable read-only view of the whole simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub turn: u32,
    pub outcome: Outcome,
    pub market: MarketState,
    pub regions: Vec<RegionView>,
    pub agents: Vec<AgentView>,
}

/// A running game: state, RNG and message log.
#[derive(Clone, Debug)]
pub struct Simulation {
    state: SimulationState,
    rng: ChaCha8Rng,
    log: VecDeque<String>,
}

impl Simulation {
    /// Validate the scenario and build the starting state from its seed.
    pub fn new(scenario: &Scenario) -> Result<Self, SimError> {
        validate_scenario(scenario)?;
        let config = scenario.config.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(config.rng_seed);

        let mut competitors = Vec::with_capacity(config.competitor_count);
        for i in 0..config.competitor_count {
            competitors.push(spawn_competitor(i, &mut rng)?);
        }
        let mut regions = Vec::with_capacity(scenario.regions.len());
        for (i, spec) in scenario.regions.iter().enumerate() {
            regions.push(seed_region(RegionId(i), spec, &mut rng)?);
        }

        let player = Agent::new(AgentId::Player, "Player", config.player_start_balance);
        let mut state = SimulationState {
            config,
            regions,
            player,
            competitors,
            turn: 0,
            market: compute_supply_demand(std::iter::empty(), 0),
            outcome: Outcome::InProgress,
        };
        let market = compute_supply_demand(
            state.agents().map(|a| a.processed),
            state.config.market_demand,
        );
        reprice_regions(&mut state.regions, &market, &mut rng)?;
        state.market = market;
        state.check_invariants()?;

        info!(
            seed = state.config.rng_seed,
            regions = state.regions.len(),
            competitors = state.competitors.len(),
            "simulation created"
        );
        let log = VecDeque::with_capacity(state.config.log_capacity);
        Ok(Self { state, rng, log })
    }

    /// Run the full turn pipeline once.
    ///
    /// After the game has ended this returns the final outcome without
    /// running any phase. The turn runs on a working copy of the state and RNG
    /// that is committed only on success, so an error leaves both untouched.
    pub fn advance_turn(&mut self) -> Result<TurnSummary, SimError> {
        if self.state.outcome.is_over() {
            return Ok(TurnSummary {
                turn: self.state.turn,
                outcome: self.state.outcome,
                event: None,
                messages: Vec::new(),
            });
        }
        let mut next = self.state.clone();
        let mut rng = self.rng.clone();
        next.turn += 1;
        let span = debug_span!("turn", turn = next.turn);
        let _enter = span.enter();

        let ctx = turn::run_turn(&mut next, &mut rng)?;
        next.check_invariants()?;
        self.state = next;
        self.rng = rng;

        let mut messages = ctx.messages;
        messages.insert(0, format!("--- Turn {} ---", self.state.turn));
        for m in &messages {
            self.push_log(m.clone());
        }
        info!(
            turn = self.state.turn,
            outcome = ?self.state.outcome,
            balance = %self.state.player.balance,
            "turn complete"
        );
        Ok(TurnSummary {
            turn: self.state.turn,
            outcome: self.state.outcome,
            event: ctx.event,
            messages,
        })
    }

    fn push_log(&mut self, message: String) {
        if self.state.config.log_capacity == 0 {
            return;
        }
        while self.log.len() >= self.state.config.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(message);
    }

    // ---- intents ----

    /// Hire one worker. Competitors pass the affordability check with a
    /// fraction of the labor cost but pay it in full.
    pub fn hire_worker(&mut self, agent: AgentId, region: RegionId) -> Result<bool, SimError> {
        let ratio = self.state.hire_ratio(agent);
        let (a, r) = self.state.agent_and_region_mut(agent, region)?;
        let ok = a.hire_worker(r, ratio);
        debug!(%agent, %region, ok, "hire worker");
        Ok(ok)
    }

    pub fn fire_worker(&mut self, agent: AgentId, region: RegionId) -> Result<bool, SimError> {
        let (a, r) = self.state.agent_and_region_mut(agent, region)?;
        let ok = a.fire_worker(r);
        debug!(%agent, %region, ok, "fire worker");
        Ok(ok)
    }

    /// Buy `amount` raw units (the UI uses [`sim_core::TRADE_LOT`]).
    pub fn buy_raw_material(&mut self, agent: AgentId, region: RegionId, amount: u64) -> Result<bool, SimError> {
        let (a, r) = self.state.agent_and_region_mut(agent, region)?;
        let ok = a.buy_raw_material(r, amount);
        debug!(%agent, %region, amount, ok, "buy raw material");
        Ok(ok)
    }

    /// Sell `amount` processed units at the region's price after tax.
    pub fn sell_processed(&mut self, agent: AgentId, region: RegionId, amount: u64) -> Result<bool, SimError> {
        let (a, r) = self.state.agent_and_region_mut(agent, region)?;
        let ok = a.sell_processed(r, amount);
        debug!(%agent, %region, amount, ok, "sell processed");
        Ok(ok)
    }

    // ---- queries ----

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.state.config
    }

    pub fn turn(&self) -> u32 {
        self.state.turn
    }

    pub fn regions(&self) -> &[Region] {
        &self.state.regions
    }

    pub fn region(&self, id: RegionId) -> Result<&Region, SimError> {
        self.state.region(id)
    }

    pub fn player(&self) -> &Agent {
        &self.state.player
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.state.competitors
    }

    pub fn agent(&self, id: AgentId) -> Result<&Agent, SimError> {
        self.state.agent(id)
    }

    pub fn market(&self) -> &MarketState {
        &self.state.market
    }

    pub fn market_share(&self, id: AgentId) -> Result<f64, SimError> {
        self.state.market_share(id)
    }

    pub fn outcome(&self) -> Outcome {
        self.state.outcome
    }

    pub fn is_game_over(&self) -> bool {
        self.state.outcome.is_over()
    }

    /// The winning agent, if any. A bankrupt player has no single winner.
    pub fn winner(&self) -> Option<AgentId> {
        match self.state.outcome {
            Outcome::PlayerWon => Some(AgentId::Player),
            Outcome::CompetitorWon(id) => Some(id),
            Outcome::InProgress | Outcome::PlayerBankrupt => None,
        }
    }

    /// Most recent messages, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &str> + '_ {
        self.log.iter().map(String::as_str)
    }

    pub fn progress(&self) -> Progress {
        let target = self.state.config.target_money;
        let money_fraction = if target > Decimal::ZERO {
            use rust_decimal::prelude::ToPrimitive;
            (self.state.player.balance / target).to_f64().unwrap_or(0.0)
        } else {
            1.0
        };
        Progress {
            money_fraction,
            market_share: self.state.market_share(AgentId::Player).unwrap_or(0.0),
        }
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let s = &self.state;
        let regions = s
            .regions
            .iter()
            .map(|r| RegionView {
                id: r.id,
                name: r.name.clone(),
                raw_material_cost: r.raw_material_cost,
                labor_cost: r.labor_cost,
                tax_rate: r.tax_rate,
                min_price: r.min_price,
                max_price: r.max_price,
                current_price: r.current_price,
                factors: r.factors,
                workers: r.worker_pools().collect(),
            })
            .collect();
        let view = |a: &Agent, aggressive: Option<f64>| AgentView {
            id: a.id,
            name: a.name.clone(),
            balance: a.balance,
            raw_material: a.raw_material,
            processed: a.processed,
            equipment_multiplier: a.equipment_multiplier,
            market_share: a.market_share,
            aggressive_factor: aggressive,
        };
        let agents = std::iter::once(view(&s.player, None))
            .chain(s.competitors.iter().map(|c| view(&c.agent, Some(c.aggressive_factor))))
            .collect();
        SimSnapshot {
            turn: s.turn,
            outcome: s.outcome,
            market: s.market,
            regions,
            agents,
        }
    }
}

/// Create competitor `index` with a randomized starting endowment.
fn spawn_competitor<R: Rng + ?Sized>(index: usize, rng: &mut R) -> Result<Competitor, SimError> {
    let money_multiplier: f64 = rng.gen_range(2.0..=3.0);
    let stock_multiplier: f64 = rng.gen_range(1.5..=2.0);
    let base_money: u32 = rng.gen_range(5_000..=15_000);
    let base_raw: u32 = rng.gen_range(100..=300);
    let base_processed: u32 = rng.gen_range(50..=150);

    let id = AgentId::Competitor(index);
    let mut agent = Agent::new(id, format!("Company {}", index + 1), to_money(f64::from(base_money) * money_multiplier)?);
    agent.raw_material = (f64::from(base_raw) * stock_multiplier).floor() as u64;
    agent.processed = (f64::from(base_processed) * stock_multiplier).floor() as u64;
    agent.equipment_multiplier = rng.gen_range(1.2..=1.5);
    let aggressive_factor = rng.gen_range(1.5..=3.0);
    Ok(Competitor::new(agent, aggressive_factor))
}

/// Advance up to `turns` turns, stopping early once the game ends.
pub fn run_turns(sim: &mut Simulation, turns: u32) -> Result<Vec<TurnSummary>, SimError> {
    let mut out = Vec::with_capacity(turns as usize);
    for _ in 0..turns {
        if sim.is_game_over() {
            break;
        }
        out.push(sim.advance_turn()?);
    }
    Ok(out)
}

/// One region, one competitor, neutral factors: raw cost 5, wage 250, tax 10%.
#[cfg(test)]
pub(crate) fn fixture_state() -> SimulationState {
    let spec = sim_core::RegionSpec {
        name: "Indonesia".into(),
        raw_material_cost: Decimal::new(5, 0),
        labor_cost: Decimal::new(250, 0),
        tax_rate: Decimal::new(1, 1),
        potential_yield: 500,
        icon: None,
    };
    let mut region = Region::new(
        RegionId(0),
        &spec,
        EconomicFactors::default(),
        spec.raw_material_cost,
        spec.labor_cost,
    );
    region.current_price = Decimal::new(50, 0);
    let mut rival = Agent::new(AgentId::Competitor(0), "Company 1", Decimal::new(10_000, 0));
    rival.equipment_multiplier = 1.3;
    SimulationState {
        config: SimConfig::default(),
        regions: vec![region],
        player: Agent::new(AgentId::Player, "Player", Decimal::new(5_000, 0)),
        competitors: vec![Competitor::new(rival, 2.0)],
        turn: 0,
        market: compute_supply_demand(std::iter::empty(), 100_000),
        outcome: Outcome::InProgress,
    }
}
