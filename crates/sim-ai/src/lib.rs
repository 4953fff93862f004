#![deny(warnings)]

//! Competitor decision policy.
//!
//! Each turn a competitor ranks regions by projected profit, produces in every
//! profitable one, sells in the best three and hires in the three cheapest.

use rand::Rng;
use rust_decimal::Decimal;
use sim_core::{Competitor, Region, RegionId};
use sim_econ::{harvest, pack, to_money, EconError};
use tracing::debug;

/// How many regions a competitor sells or hires in per turn.
pub const TOP_REGIONS: usize = 3;
/// Units per sale lot before the aggressive multiplier.
pub const SALE_LOT: u64 = 100;

/// A region with the score it was ranked by.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionScore {
    pub region: RegionId,
    pub score: Decimal,
}

/// What a competitor did during its turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompetitorReport {
    pub profitable_regions: usize,
    pub harvested: u64,
    pub packed: u64,
    pub sold: u64,
    pub revenue: Decimal,
    pub hired: u32,
}

/// `(price - raw cost) * 100 * aggressive`.
pub fn projected_profit(region: &Region, aggressive: Decimal) -> Decimal {
    (region.current_price - region.raw_material_cost) * Decimal::from(SALE_LOT) * aggressive
}

/// Regions with positive projected profit, best first. Ties keep region order.
pub fn rank_profitable(regions: &[Region], aggressive_factor: f64) -> Result<Vec<RegionScore>, EconError> {
    let aggressive = to_money(aggressive_factor)?;
    let mut ranked: Vec<RegionScore> = regions
        .iter()
        .map(|r| RegionScore {
            region: r.id,
            score: projected_profit(r, aggressive),
        })
        .filter(|s| s.score > Decimal::ZERO)
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(ranked)
}

/// All regions by `labor_cost * aggressive`, cheapest first.
pub fn rank_hiring(regions: &[Region], aggressive_factor: f64) -> Result<Vec<RegionScore>, EconError> {
    let aggressive = to_money(aggressive_factor)?;
    let mut ranked: Vec<RegionScore> = regions
        .iter()
        .map(|r| RegionScore {
            region: r.id,
            score: r.labor_cost * aggressive,
        })
        .collect();
    ranked.sort_by(|a, b| a.score.cmp(&b.score));
    Ok(ranked)
}

/// Run one competitor's turn against the shared regions.
///
/// Hiring stops at the first unaffordable worker in a region; workers already
/// hired stay hired.
pub fn run_competitor_turn<R: Rng + ?Sized>(
    competitor: &mut Competitor,
    regions: &mut [Region],
    hire_ratio: Decimal,
    rng: &mut R,
) -> Result<CompetitorReport, EconError> {
    let mut report = CompetitorReport::default();
    let intensity = competitor.intensity();
    let aggressive = competitor.aggressive_factor;
    let agent = &mut competitor.agent;

    let profitable = rank_profitable(regions, aggressive)?;
    report.profitable_regions = profitable.len();

    for scored in &profitable {
        let workers = regions[scored.region.0].workers_of(agent.id);
        let raw = harvest(workers, agent.equipment_multiplier);
        agent.raw_material = agent.raw_material.saturating_add(raw);
        let packed = agent.pack(pack(workers, agent.raw_material, agent.equipment_multiplier));
        report.harvested += raw;
        report.packed += packed;
    }

    for scored in profitable.iter().take(TOP_REGIONS) {
        let region = &regions[scored.region.0];
        let amount = (SALE_LOT * intensity).min(agent.processed);
        if amount == 0 {
            continue;
        }
        let revenue = region.net_sale_value(amount);
        if agent.sell_processed(region, amount) {
            report.sold += amount;
            report.revenue += revenue;
        }
    }

    let hiring = rank_hiring(regions, aggressive)?;
    for scored in hiring.iter().take(TOP_REGIONS) {
        let region = &mut regions[scored.region.0];
        let wanted = u64::from(rng.gen_range(1u32..=3)) * 2 * intensity;
        for _ in 0..wanted {
            if !agent.hire_worker(region, hire_ratio) {
                break;
            }
            report.hired += 1;
        }
    }

    debug!(
        competitor = %agent.name,
        profitable = report.profitable_regions,
        sold = report.sold,
        revenue = %report.revenue,
        hired = report.hired,
        "competitor turn"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::{Agent, AgentId, EconomicFactors, RegionSpec};

    fn region(id: usize, raw: i64, labor: i64, price: i64) -> Region {
        let spec = RegionSpec {
            name: format!("R{id}"),
            raw_material_cost: Decimal::new(raw, 0),
            labor_cost: Decimal::new(labor, 0),
            tax_rate: Decimal::new(1, 1),
            potential_yield: 500,
            icon: None,
        };
        let mut r = Region::new(RegionId(id), &spec, EconomicFactors::default(), spec.raw_material_cost, spec.labor_cost);
        r.current_price = Decimal::new(price, 0);
        r
    }

    fn competitor(balance: i64, aggressive: f64) -> Competitor {
        let mut agent = Agent::new(AgentId::Competitor(0), "Company 1", Decimal::new(balance, 0));
        agent.equipment_multiplier = 1.0;
        Competitor::new(agent, aggressive)
    }

    #[test]
    fn ranks_profitable_descending() {
        let regions = vec![region(0, 5, 250, 30), region(1, 5, 200, 60), region(2, 10, 300, 10), region(3, 4, 100, 45)];
        let ranked = rank_profitable(&regions, 2.0).unwrap();
        let ids: Vec<usize> = ranked.iter().map(|s| s.region.0).collect();
        assert_eq!(ids, vec![1, 3, 0]);
        assert_eq!(ranked[0].score, Decimal::new(11_000, 0));
    }

    #[test]
    fn ranks_hiring_ascending() {
        let regions = vec![region(0, 5, 250, 30), region(1, 5, 200, 60), region(2, 10, 300, 10), region(3, 4, 100, 45)];
        let ranked = rank_hiring(&regions, 1.5).unwrap();
        let ids: Vec<usize> = ranked.iter().map(|s| s.region.0).collect();
        assert_eq!(ids, vec![3, 1, 0, 2]);
    }

    #[test]
    fn no_profitable_region_means_no_sale() {
        let mut regions = vec![region(0, 10, 1_000_000, 10), region(1, 10, 1_000_000, 5)];
        let mut c = competitor(100, 2.0);
        c.agent.processed = 500;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let report = run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
        assert_eq!(report.profitable_regions, 0);
        assert_eq!(report.sold, 0);
        assert_eq!(report.revenue, Decimal::ZERO);
        assert_eq!(c.agent.processed, 500);
        assert_eq!(c.agent.balance, Decimal::new(100, 0));
        assert_eq!(report.hired, 0);
    }

    #[test]
    fn empty_inventory_sells_nothing() {
        let mut regions = vec![region(0, 5, 1_000_000, 50)];
        let mut c = competitor(0, 2.5);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let report = run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
        assert_eq!(report.profitable_regions, 1);
        assert_eq!(report.revenue, Decimal::ZERO);
        assert_eq!(c.agent.balance, Decimal::ZERO);
    }

    #[test]
    fn sells_lot_scaled_by_intensity() {
        let mut regions = vec![region(0, 5, 1_000_000, 50)];
        let mut c = competitor(0, 2.7);
        c.agent.processed = 1_000;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let report = run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
        assert_eq!(report.sold, 200);
        assert_eq!(c.agent.processed, 800);
        // 50 * 200 * 0.9
        assert_eq!(c.agent.balance, Decimal::new(9_000, 0));
    }

    #[test]
    fn produces_in_profitable_regions() {
        let mut regions = vec![region(0, 5, 1_000_000, 50)];
        regions[0].adjust_workers(AgentId::Competitor(0), 2);
        let mut c = competitor(0, 1.5);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let report = run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
        assert_eq!(report.harvested, 200);
        assert_eq!(report.packed, 150);
        // 150 packed, 100 sold
        assert_eq!(c.agent.processed, 50);
        assert_eq!(c.agent.raw_material, 50);
    }

    #[test]
    fn hiring_stops_when_funds_run_out() {
        let mut regions = vec![region(0, 5, 100, 1)];
        let mut c = competitor(250, 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let report = run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
        // 250 -> 150 -> 50, then 50 < 80 stops
        assert_eq!(report.hired, 2);
        assert_eq!(regions[0].workers_of(AgentId::Competitor(0)), 2);
        assert_eq!(c.agent.balance, Decimal::new(50, 0));
    }

    #[test]
    fn sells_and_hires_only_in_top_three() {
        let mut regions: Vec<Region> = (0..5)
            .map(|i| region(i, 5, 100 + 10 * i as i64, 70 - 5 * i as i64))
            .collect();
        let mut c = competitor(1_000_000, 2.0);
        c.agent.processed = 10_000;
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let report = run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
        assert_eq!(report.profitable_regions, 5);
        assert_eq!(report.sold, 3 * SALE_LOT * 2);
        assert_eq!(c.agent.processed, 10_000 - 600);
        // (70 + 65 + 60) * 200 * 0.9
        assert_eq!(report.revenue, Decimal::new(35_100, 0));
        let hired: Vec<u32> = regions.iter().map(|r| r.workers_of(AgentId::Competitor(0))).collect();
        for workers in &hired[..3] {
            assert!((4..=12).contains(workers), "hired {hired:?}");
        }
        assert_eq!(&hired[3..], &[0, 0]);
        assert_eq!(report.hired, hired.iter().sum::<u32>());
    }

    proptest! {
        #[test]
        fn turn_keeps_agent_non_negative(seed in any::<u64>(), balance in 0i64..50_000, processed in 0u64..5_000, aggressive in 1.5f64..3.0) {
            let mut regions = vec![region(0, 5, 250, 40), region(1, 6, 300, 90), region(2, 4, 200, 10), region(3, 8, 150, 60)];
            let mut c = competitor(balance, aggressive);
            c.agent.processed = processed;
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..5 {
                run_competitor_turn(&mut c, &mut regions, Decimal::new(8, 1), &mut rng).unwrap();
                prop_assert!(c.agent.balance >= Decimal::ZERO);
            }
        }
    }
}
