#![deny(warnings)]

//! Core domain models and invariants for the tea market simulation.
//!
//! This crate defines the serializable scenario/config types, the region and
//! agent records mutated by the turn engine, and the bookkeeping operations
//! (hire, fire, buy, sell) that keep those records consistent. Validation
//! helpers guard the invariants a scenario must satisfy before a simulation
//! is built from it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Fixed lot size used by the buy/sell intents.
pub const TRADE_LOT: u64 = 100;

/// Stable identifier for an economic participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentId {
    /// The single human-controlled agent.
    Player,
    /// Autonomous competitor, indexed in creation order.
    Competitor(usize),
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Player => write!(f, "player"),
            AgentId::Competitor(i) => write!(f, "competitor#{i}"),
        }
    }
}

/// Index of a region in scenario order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub usize);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Static baseline of one region as read from a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Unique region name.
    pub name: String,
    /// Baseline raw-material cost per unit.
    pub raw_material_cost: Decimal,
    /// Baseline wage per worker per turn.
    pub labor_cost: Decimal,
    /// Sales tax in [0, 1).
    pub tax_rate: Decimal,
    /// Potential yield cap (informational).
    #[serde(default)]
    pub potential_yield: u32,
    /// Icon reference for the presentation layer.
    #[serde(default)]
    pub icon: Option<String>,
}

impl RegionSpec {
    fn builtin(name: &str, raw: i64, raw_scale: u32, labor: i64, tax_pct: i64, yield_cap: u32, icon: &str) -> Self {
        Self {
            name: name.to_string(),
            raw_material_cost: Decimal::new(raw, raw_scale),
            labor_cost: Decimal::new(labor, 0),
            tax_rate: Decimal::new(tax_pct, 2),
            potential_yield: yield_cap,
            icon: Some(icon.to_string()),
        }
    }
}

/// The ten regions every default game starts with.
pub fn default_regions() -> Vec<RegionSpec> {
    vec![
        RegionSpec::builtin("Indonesia", 50, 1, 250, 10, 500, "indonesia.png"),
        RegionSpec::builtin("India", 60, 1, 300, 12, 600, "india.png"),
        RegionSpec::builtin("China", 75, 1, 325, 15, 700, "china.png"),
        RegionSpec::builtin("Turkey", 65, 1, 310, 13, 550, "turkey.png"),
        RegionSpec::builtin("Kenya", 40, 1, 200, 8, 450, "kenya.png"),
        RegionSpec::builtin("Germany", 100, 1, 400, 20, 800, "germany.png"),
        RegionSpec::builtin("Russia", 85, 1, 380, 17, 750, "russia.png"),
        RegionSpec::builtin("USA", 125, 1, 450, 25, 700, "usa.png"),
        RegionSpec::builtin("Argentina", 55, 1, 275, 11, 650, "argentina.png"),
        RegionSpec::builtin("Australia", 90, 1, 425, 18, 850, "australia.png"),
    ]
}

/// Simulation configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Player balance at game start.
    pub player_start_balance: Decimal,
    /// Balance that wins the game.
    pub target_money: Decimal,
    /// Market share in (0, 1] that wins the game.
    pub monopoly_threshold: f64,
    /// First turn on which the player may be declared winner.
    pub win_min_turn: u32,
    /// Baseline global demand for processed goods.
    pub market_demand: u64,
    /// Probability that a random event fires in a turn.
    pub event_chance: f64,
    /// Number of autonomous competitors.
    pub competitor_count: usize,
    /// Fraction of the labor cost a competitor must hold to hire.
    pub competitor_hire_ratio: Decimal,
    /// Whether competitors also settle wages each turn.
    pub competitor_wages: bool,
    /// Number of messages kept in the rolling game log.
    pub log_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            player_start_balance: Decimal::new(5_000, 0),
            target_money: Decimal::new(500_000, 0),
            monopoly_threshold: 0.6,
            win_min_turn: 7,
            market_demand: 100_000,
            event_chance: 0.1,
            competitor_count: 3,
            competitor_hire_ratio: Decimal::new(8, 1),
            competitor_wages: false,
            log_capacity: 10,
        }
    }
}

/// A complete game setup: configuration plus the region table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: SimConfig,
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionSpec>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            config: SimConfig::default(),
            regions: default_regions(),
        }
    }
}

/// Four bounded multipliers describing a region's current economy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicFactors {
    pub stability: f64,
    pub labor_pressure: f64,
    pub agricultural_conditions: f64,
    pub market_development: f64,
}

impl Default for EconomicFactors {
    fn default() -> Self {
        Self {
            stability: 1.0,
            labor_pressure: 1.0,
            agricultural_conditions: 1.0,
            market_development: 1.0,
        }
    }
}

/// One economic zone: baseline costs, current economy and worker pools.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub base_raw_material_cost: Decimal,
    pub base_labor_cost: Decimal,
    pub tax_rate: Decimal,
    pub potential_yield: u32,
    pub icon: Option<String>,
    pub factors: EconomicFactors,
    /// Current raw-material cost per unit.
    pub raw_material_cost: Decimal,
    /// Current wage per worker, always a whole amount.
    pub labor_cost: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub current_price: Decimal,
    workers: BTreeMap<AgentId, u32>,
}

impl Region {
    /// Build a region from its spec with explicit starting costs.
    ///
    /// Price bounds follow from `raw_material_cost`; the current price starts
    /// at the lower bound until the first repricing.
    pub fn new(
        id: RegionId,
        spec: &RegionSpec,
        factors: EconomicFactors,
        raw_material_cost: Decimal,
        labor_cost: Decimal,
    ) -> Self {
        let mut region = Self {
            id,
            name: spec.name.clone(),
            base_raw_material_cost: spec.raw_material_cost,
            base_labor_cost: spec.labor_cost,
            tax_rate: spec.tax_rate,
            potential_yield: spec.potential_yield,
            icon: spec.icon.clone(),
            factors,
            raw_material_cost,
            labor_cost: labor_cost.floor().max(Decimal::ZERO),
            min_price: Decimal::ZERO,
            max_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            workers: BTreeMap::new(),
        };
        region.update_price_bounds();
        region.current_price = region.min_price;
        region
    }

    /// Recompute `[min_price, max_price]` as 5x and 15x the raw-material cost.
    pub fn update_price_bounds(&mut self) {
        self.min_price = self.raw_material_cost * Decimal::new(5, 0);
        self.max_price = self.raw_material_cost * Decimal::new(15, 0);
    }

    /// Clamp a candidate price into this region's bounds.
    pub fn clamp_price(&self, price: Decimal) -> Decimal {
        price.max(self.min_price).min(self.max_price)
    }

    /// Worker count for an agent (0 if it never hired here).
    pub fn workers_of(&self, agent: AgentId) -> u32 {
        self.workers.get(&agent).copied().unwrap_or(0)
    }

    /// Add `delta` workers for an agent, clamping the result at 0.
    pub fn adjust_workers(&mut self, agent: AgentId, delta: i64) {
        let current = i64::from(self.workers_of(agent));
        let next = current.saturating_add(delta).clamp(0, i64::from(u32::MAX));
        self.workers.insert(agent, next as u32);
    }

    /// Dismiss every worker an agent has here, returning how many left.
    pub fn dismiss_all(&mut self, agent: AgentId) -> u32 {
        let gone = self.workers_of(agent);
        self.workers.insert(agent, 0);
        gone
    }

    /// Total workers employed in this region across all agents.
    pub fn total_workers(&self) -> u64 {
        self.workers.values().map(|&w| u64::from(w)).sum()
    }

    /// Wage bill for an agent's workers at the current labor cost.
    pub fn wage_bill(&self, agent: AgentId) -> Decimal {
        Decimal::from(self.workers_of(agent)) * self.labor_cost
    }

    /// Revenue from selling `amount` processed units here, after tax.
    pub fn net_sale_value(&self, amount: u64) -> Decimal {
        self.current_price * Decimal::from(amount) * (Decimal::ONE - self.tax_rate)
    }

    /// Iterate `(agent, workers)` pairs in agent order.
    pub fn worker_pools(&self) -> impl Iterator<Item = (AgentId, u32)> + '_ {
        self.workers.iter().map(|(&a, &w)| (a, w))
    }
}

/// Balances, inventories and equipment of one participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Currency on hand, never negative.
    pub balance: Decimal,
    /// Harvested but unpacked units.
    pub raw_material: u64,
    /// Packed units ready for sale.
    pub processed: u64,
    /// Production efficiency factor (>= 1.0).
    pub equipment_multiplier: f64,
    /// Share of global processed inventory as of the last evaluation.
    pub market_share: f64,
}

impl Agent {
    pub fn new(id: AgentId, name: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            balance,
            raw_material: 0,
            processed: 0,
            equipment_multiplier: 1.0,
            market_share: 0.0,
        }
    }

    /// Hire one worker when `balance >= labor_cost * affordability_ratio`.
    ///
    /// The full labor cost is charged; the balance saturates at zero.
    pub fn hire_worker(&mut self, region: &mut Region, affordability_ratio: Decimal) -> bool {
        if self.balance < region.labor_cost * affordability_ratio {
            return false;
        }
        self.balance = (self.balance - region.labor_cost).max(Decimal::ZERO);
        region.adjust_workers(self.id, 1);
        true
    }

    /// Dismiss one worker; fails when none are employed here.
    pub fn fire_worker(&mut self, region: &mut Region) -> bool {
        if region.workers_of(self.id) == 0 {
            return false;
        }
        region.adjust_workers(self.id, -1);
        true
    }

    /// Buy `amount` raw units at the region's current raw-material cost.
    pub fn buy_raw_material(&mut self, region: &Region, amount: u64) -> bool {
        let cost = region.raw_material_cost * Decimal::from(amount);
        if self.balance < cost {
            return false;
        }
        self.balance -= cost;
        self.raw_material = self.raw_material.saturating_add(amount);
        true
    }

    /// Sell `amount` processed units at the region's current price after tax.
    pub fn sell_processed(&mut self, region: &Region, amount: u64) -> bool {
        if self.processed < amount {
            return false;
        }
        self.processed -= amount;
        self.balance += region.net_sale_value(amount);
        true
    }

    /// Move up to `amount` units from raw to processed inventory, returning the moved amount.
    pub fn pack(&mut self, amount: u64) -> u64 {
        let moved = amount.min(self.raw_material);
        self.raw_material -= moved;
        self.processed = self.processed.saturating_add(moved);
        moved
    }

    /// Deduct a wage bill. Returns false and zeroes the balance if it does not cover it.
    pub fn pay_wages(&mut self, bill: Decimal) -> bool {
        if self.balance >= bill {
            self.balance -= bill;
            true
        } else {
            self.balance = Decimal::ZERO;
            false
        }
    }
}

/// An autonomous agent with its trading temperament.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub agent: Agent,
    /// Scales trading and hiring intensity, typically in [1.5, 3.0].
    pub aggressive_factor: f64,
    /// Accumulated per-region influence; not read by any policy yet.
    pub influence: BTreeMap<RegionId, Decimal>,
}

impl Competitor {
    pub fn new(agent: Agent, aggressive_factor: f64) -> Self {
        Self {
            agent,
            aggressive_factor,
            influence: BTreeMap::new(),
        }
    }

    /// Add (or with a negative amount, remove) influence, never below zero.
    pub fn add_influence(&mut self, region: RegionId, amount: Decimal) {
        let entry = self.influence.entry(region).or_insert(Decimal::ZERO);
        *entry = (*entry + amount).max(Decimal::ZERO);
    }

    /// `floor(aggressive_factor)` as a whole multiplier.
    pub fn intensity(&self) -> u64 {
        self.aggressive_factor.max(0.0).floor() as u64
    }
}

/// Validation errors for scenario invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A game needs at least one region.
    #[error("scenario defines no regions")]
    NoRegions,
    /// Region names must be non-empty.
    #[error("region name must not be empty")]
    EmptyRegionName,
    /// Region names are unique keys.
    #[error("duplicate region name: {0}")]
    DuplicateRegion(String),
    /// Price or cost must be non-negative.
    #[error("negative monetary value for {0}")]
    NegativeMoney(String),
    /// Tax rate must be within [0, 1).
    #[error("tax rate for {0} must be within [0,1)")]
    InvalidTaxRate(String),
    /// Monopoly threshold must be within (0, 1].
    #[error("monopoly threshold must be within (0,1]")]
    InvalidThreshold,
    /// Probability must be within [0, 1].
    #[error("event chance must be within [0,1]")]
    InvalidProbability,
    /// Hire ratio must be within (0, 1].
    #[error("competitor hire ratio must be within (0,1]")]
    InvalidHireRatio,
}

/// Validate a single region spec.
pub fn validate_region_spec(spec: &RegionSpec) -> Result<(), ValidationError> {
    if spec.name.trim().is_empty() {
        return Err(ValidationError::EmptyRegionName);
    }
    if spec.raw_material_cost < Decimal::ZERO || spec.labor_cost < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(spec.name.clone()));
    }
    if spec.tax_rate < Decimal::ZERO || spec.tax_rate >= Decimal::ONE {
        return Err(ValidationError::InvalidTaxRate(spec.name.clone()));
    }
    Ok(())
}

/// Validate configuration parameters.
pub fn validate_config(cfg: &SimConfig) -> Result<(), ValidationError> {
    if cfg.player_start_balance < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney("player_start_balance".into()));
    }
    if cfg.target_money < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney("target_money".into()));
    }
    if !cfg.monopoly_threshold.is_finite() || cfg.monopoly_threshold <= 0.0 || cfg.monopoly_threshold > 1.0 {
        return Err(ValidationError::InvalidThreshold);
    }
    if !(0.0..=1.0).contains(&cfg.event_chance) {
        return Err(ValidationError::InvalidProbability);
    }
    if cfg.competitor_hire_ratio <= Decimal::ZERO || cfg.competitor_hire_ratio > Decimal::ONE {
        return Err(ValidationError::InvalidHireRatio);
    }
    Ok(())
}

/// Validate a whole scenario, including region name uniqueness.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    validate_config(&scenario.config)?;
    if scenario.regions.is_empty() {
        return Err(ValidationError::NoRegions);
    }
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for spec in &scenario.regions {
        validate_region_spec(spec)?;
        if !names.insert(spec.name.as_str()) {
            return Err(ValidationError::DuplicateRegion(spec.name.clone()));
        }
    }
    Ok(())
}
