#![deny(warnings)]

//! Economic models: regional price formation and production yields.
//!
//! This module provides the stochastic and deterministic helpers a turn is
//! built from:
//! - Bounded random-walk drift of a region's economic factors
//! - Cost recomputation and price bounds
//! - Per-region price draws with volatility
//! - Harvest and packing yields
//! - Global supply/demand pressure applied to regional prices

use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{EconomicFactors, Region, RegionId, RegionSpec};
use thiserror::Error;
use tracing::trace;

/// Raw units one worker harvests per turn before equipment.
pub const HARVEST_PER_WORKER: f64 = 100.0;
/// Raw units one worker packs per turn before equipment.
pub const PACK_PER_WORKER: f64 = 75.0;
/// Share of the supply/demand imbalance passed through to prices.
pub const PRESSURE_WEIGHT: f64 = 0.3;
/// Half-width of the volatility term applied to a price draw.
pub const PRICE_VOLATILITY: f64 = 0.2;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Numeric conversion between floating point and money failed.
    #[error("non-finite numeric conversion")]
    NonFinite,
}

/// Convert a float into money, refusing NaN and infinities.
pub fn to_money(value: f64) -> Result<Decimal, EconError> {
    if !value.is_finite() {
        return Err(EconError::NonFinite);
    }
    Decimal::from_f64(value).ok_or(EconError::NonFinite)
}

fn to_float(value: Decimal) -> Result<f64, EconError> {
    value.to_f64().ok_or(EconError::NonFinite)
}

/// Multiplicative drift rule for one economic factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FactorRule {
    /// Maximum relative change per turn, e.g. 0.05 for ±5%.
    pub spread: f64,
    pub min: f64,
    pub max: f64,
}

impl FactorRule {
    /// Apply one drift step and clamp to the bounds.
    pub fn step<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        let shock: f64 = rng.gen_range((1.0 - self.spread)..=(1.0 + self.spread));
        (value * shock).clamp(self.min, self.max)
    }
}

pub const STABILITY: FactorRule = FactorRule { spread: 0.05, min: 0.6, max: 1.4 };
pub const LABOR_PRESSURE: FactorRule = FactorRule { spread: 0.07, min: 0.7, max: 1.3 };
pub const AGRICULTURAL: FactorRule = FactorRule { spread: 0.10, min: 0.5, max: 1.5 };
pub const MARKET_DEVELOPMENT: FactorRule = FactorRule { spread: 0.05, min: 0.8, max: 1.2 };

/// Starting factors for a freshly created region.
///
/// Stability and labor pressure may start outside their drift bounds; the
/// first drift pulls them back in.
pub fn initial_factors<R: Rng + ?Sized>(rng: &mut R) -> EconomicFactors {
    EconomicFactors {
        stability: rng.gen_range(0.5..=1.5),
        labor_pressure: rng.gen_range(0.5..=1.5),
        agricultural_conditions: rng.gen_range(0.8..=1.2),
        market_development: rng.gen_range(0.8..=1.2),
    }
}

/// Build a region with randomized starting economy and costs jittered ±20%.
pub fn seed_region<R: Rng + ?Sized>(
    id: RegionId,
    spec: &RegionSpec,
    rng: &mut R,
) -> Result<Region, EconError> {
    let factors = initial_factors(rng);
    let raw_jitter = to_money(rng.gen_range(0.8..=1.2))?;
    let labor_jitter = to_money(rng.gen_range(0.8..=1.2))?;
    Ok(Region::new(
        id,
        spec,
        factors,
        spec.raw_material_cost * raw_jitter,
        spec.labor_cost * labor_jitter,
    ))
}

/// Random-walk every factor once, in a fixed order.
pub fn drift_factors<R: Rng + ?Sized>(factors: &mut EconomicFactors, rng: &mut R) {
    factors.stability = STABILITY.step(factors.stability, rng);
    factors.labor_pressure = LABOR_PRESSURE.step(factors.labor_pressure, rng);
    factors.agricultural_conditions = AGRICULTURAL.step(factors.agricultural_conditions, rng);
    factors.market_development = MARKET_DEVELOPMENT.step(factors.market_development, rng);
}

/// Recompute current costs and price bounds from the baseline and factors.
///
/// raw = base_raw * (0.7 * agri + 0.3 * stability)
/// labor = floor(base_labor * (0.6 * labor_pressure + 0.4 * stability))
pub fn recompute_costs(region: &mut Region) -> Result<(), EconError> {
    let f = region.factors;
    let raw_mul = to_money(f.agricultural_conditions * 0.7 + f.stability * 0.3)?;
    let labor_mul = to_money(f.labor_pressure * 0.6 + f.stability * 0.4)?;
    region.raw_material_cost = region.base_raw_material_cost * raw_mul;
    region.labor_cost = (region.base_labor_cost * labor_mul).floor().max(Decimal::ZERO);
    region.update_price_bounds();
    Ok(())
}

/// Phase-one update for a region: drift, then recompute costs.
pub fn drift_region<R: Rng + ?Sized>(region: &mut Region, rng: &mut R) -> Result<(), EconError> {
    drift_factors(&mut region.factors, rng);
    recompute_costs(region)?;
    trace!(region = %region.name, raw = %region.raw_material_cost, labor = %region.labor_cost, "costs recomputed");
    Ok(())
}

/// Averaged weighted economic modifier used by the price draw.
pub fn economic_modifier(f: &EconomicFactors) -> f64 {
    (f.stability * 0.3 + f.market_development * 0.4 + f.agricultural_conditions * 0.3) / 3.0
}

/// Draw a new price within bounds, store it on the region and return it.
pub fn randomize_price<R: Rng + ?Sized>(region: &mut Region, rng: &mut R) -> Result<Decimal, EconError> {
    let lo = to_float(region.min_price)?;
    let hi = to_float(region.max_price)?;
    let draw: f64 = rng.gen_range(lo..=hi);
    let volatility: f64 = rng.gen_range(-PRICE_VOLATILITY..=PRICE_VOLATILITY);
    let candidate = to_money(draw * economic_modifier(&region.factors) * (1.0 + volatility))?;
    region.current_price = region.clamp_price(candidate);
    Ok(region.current_price)
}

/// Raw units harvested by `workers` with the given equipment.
pub fn harvest(workers: u32, equipment_multiplier: f64) -> u64 {
    if workers == 0 {
        return 0;
    }
    (f64::from(workers) * HARVEST_PER_WORKER * equipment_multiplier.max(0.0)).floor() as u64
}

/// Units `workers` can pack, never more than `available_raw`.
pub fn pack(workers: u32, available_raw: u64, equipment_multiplier: f64) -> u64 {
    if workers == 0 {
        return 0;
    }
    let capacity = (f64::from(workers) * PACK_PER_WORKER * equipment_multiplier.max(0.0)).floor() as u64;
    available_raw.min(capacity)
}

/// Aggregate supply/demand figures for one turn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    /// Global processed holdings, floored at 1.
    pub total_supply: u64,
    pub total_demand: u64,
    /// demand / supply.
    pub pressure: f64,
}

/// Sum processed holdings and derive the pressure signal.
pub fn compute_supply_demand<I>(holdings: I, demand: u64) -> MarketState
where
    I: IntoIterator<Item = u64>,
{
    let supply = holdings
        .into_iter()
        .fold(0u64, |acc, h| acc.saturating_add(h))
        .max(1);
    MarketState {
        total_supply: supply,
        total_demand: demand,
        pressure: demand as f64 / supply as f64,
    }
}

/// Scale a freshly drawn price by market pressure and clamp to bounds.
pub fn apply_pressure(region: &mut Region, base_price: Decimal, pressure: f64) -> Result<Decimal, EconError> {
    let factor = to_money(1.0 + (pressure - 1.0) * PRESSURE_WEIGHT)?;
    region.current_price = region.clamp_price(base_price * factor);
    Ok(region.current_price)
}

/// Reprice every region: one draw per region, then the shared pressure.
pub fn reprice_regions<R: Rng + ?Sized>(
    regions: &mut [Region],
    market: &MarketState,
    rng: &mut R,
) -> Result<(), EconError> {
    for region in regions.iter_mut() {
        let base = randomize_price(region, rng)?;
        apply_pressure(region, base, market.pressure)?;
    }
    Ok(())
}
