#![deny(warnings)]

//! Headless driver: loads a scenario, plays a simple scripted player and
//! advances turns until the game ends or the turn budget runs out.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sim_core::{AgentId, Scenario, TRADE_LOT};
use sim_runtime::Simulation;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<PathBuf>,
    turns: Option<u32>,
    seed: Option<u64>,
    json: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next().map(PathBuf::from),
            "--turns" => args.turns = it.next().and_then(|s| s.parse().ok()),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--json" => args.json = true,
            _ => {}
        }
    }
    args
}

fn load_scenario(path: Option<&PathBuf>) -> Result<Scenario> {
    let Some(path) = path else {
        return Ok(Scenario::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    let scenario: Scenario = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing scenario {}", path.display()))?;
    Ok(scenario)
}

/// One turn of player intents: sell where the net price is best, keep some
/// raw material on hand and grow the workforce in the cheapest region.
fn autoplay(sim: &mut Simulation) -> Result<()> {
    let best_market = sim
        .regions()
        .iter()
        .max_by_key(|r| r.current_price * (Decimal::ONE - r.tax_rate))
        .map(|r| r.id);
    if let Some(region) = best_market {
        while sim.sell_processed(AgentId::Player, region, TRADE_LOT)? {}
    }

    let cheapest_raw = sim
        .regions()
        .iter()
        .min_by_key(|r| r.raw_material_cost)
        .map(|r| r.id);
    if let Some(region) = cheapest_raw {
        if sim.player().raw_material < TRADE_LOT && sim.player().balance > Decimal::new(2_000, 0) {
            sim.buy_raw_material(AgentId::Player, region, TRADE_LOT)?;
        }
    }

    let cheapest_labor = sim
        .regions()
        .iter()
        .min_by_key(|r| r.labor_cost)
        .map(|r| (r.id, r.labor_cost));
    if let Some((region, wage)) = cheapest_labor {
        // Keep three wage bills in reserve.
        if sim.player().balance >= wage * Decimal::new(3, 0) {
            sim.hire_worker(AgentId::Player, region)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(?args, "starting CLI");

    let mut scenario = load_scenario(args.scenario.as_ref())?;
    if let Some(seed) = args.seed {
        scenario.config.rng_seed = seed;
    }
    let mut sim = Simulation::new(&scenario)?;
    println!(
        "Game OK | regions: {} | competitors: {} | target: ${} | monopoly: {:.0}%",
        sim.regions().len(),
        sim.competitors().len(),
        sim.config().target_money,
        sim.config().monopoly_threshold * 100.0
    );

    let turns = args.turns.unwrap_or(30);
    for _ in 0..turns {
        if sim.is_game_over() {
            break;
        }
        autoplay(&mut sim)?;
        let summary = sim.advance_turn()?;
        let progress = sim.progress();
        println!(
            "KPI | turn: {} | balance: ${} | raw: {} | packed: {} | share: {:.1}% | money: {:.1}% | event: {:?}",
            summary.turn,
            sim.player().balance.round_dp(2),
            sim.player().raw_material,
            sim.player().processed,
            progress.market_share * 100.0,
            progress.money_fraction * 100.0,
            summary.event
        );
    }

    for line in sim.messages() {
        println!("log | {line}");
    }
    println!("Outcome: {:?} | winner: {:?}", sim.outcome(), sim.winner());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&sim.snapshot())?);
    }
    Ok(())
}
