//! ASCENDANT - Balance Report
//!
//! Prints observed drop rates and damage tables for a content catalog, and a
//! currency summary of the configured player store.

use std::path::PathBuf;
use std::process::ExitCode;

use ascendant_economy::{
    resolve_damage, ActorStats, ConfiguredStore, ContentCatalog, ContentError, Creature, EngineConfig,
    LootStatistics, RandomSource, ScriptedRng, Skill,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "balance-report")]
#[command(about = "Drop rate and damage tables for ASCENDANT content")]
struct Cli {
    /// Engine config file
    #[arg(default_value = "data/engine.toml")]
    config: PathBuf,

    /// Simulated kills per creature
    #[arg(long, default_value_t = 10_000)]
    trials: u64,

    /// Attacker attack stat for the damage table
    #[arg(long, default_value_t = 500)]
    attack: u64,
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EngineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            tracing::error!("failed to load {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_filter);

    let store = match config.open_store() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("failed to open player store: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(durable = store.is_durable(), players = store.len(), "player store opened");

    match report(&cli, &config, &store) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("balance report failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn report(cli: &Cli, config: &EngineConfig, store: &ConfiguredStore) -> Result<(), ContentError> {
    let catalog = ContentCatalog::load(&config.content_path)?;
    tracing::info!(content = %config.content_path.display(), "catalog loaded");

    let mut creatures: Vec<&Creature> = catalog.creatures().collect();
    creatures.sort_by(|a, b| a.name.cmp(&b.name));
    let mut skills: Vec<&Skill> = catalog.skills().filter(|s| !s.is_passive()).collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));

    let mut rng = config.rng();
    print_drop_rates(&creatures, &mut rng, cli.trials);
    print_damage_table(&creatures, &skills, cli.attack);
    print_store_summary(store);

    if let Some(cycle) = catalog.crafting().find_cycle() {
        println!();
        println!("warning: recipe cycle {}", cycle.join(" -> "));
    }
    Ok(())
}

fn print_drop_rates(creatures: &[&Creature], rng: &mut impl RandomSource, trials: u64) {
    println!("== Drop rates ({trials} kills per creature) ==");
    for creature in creatures {
        let stats = LootStatistics::simulate(creature, rng, trials);
        let boss = if creature.boss { ", boss" } else { "" };
        println!("{} (level {}{boss})", creature.name, creature.level);
        for drop in &creature.drops {
            println!(
                "  {:<28} expected {:>8.3}%   observed {:>8.3}%",
                drop.item,
                drop.drop_rate * 100.0,
                stats.observed_rate(&drop.item) * 100.0
            );
        }
        println!("  {:<28} observed {:>8.3}%", "(nothing)", stats.empty_rate() * 100.0);
    }
}

fn print_store_summary(store: &ConfiguredStore) {
    let snapshots = store.snapshots();
    let circulating: u128 = snapshots.iter().map(|s| u128::from(s.currency)).sum();
    let richest = snapshots.iter().max_by_key(|s| s.currency);

    println!();
    println!("== Players ({}) ==", if store.is_durable() { "durable" } else { "in-memory" });
    println!("  players on record        {}", snapshots.len());
    println!("  currency in circulation  {circulating}");
    if let Some(richest) = richest {
        println!("  richest player           {} ({})", richest.player_id, richest.currency);
    }
}

/// Levels worth showing for a skill: 1, the midpoint and the cap.
fn sample_levels(skill: &Skill) -> Vec<u32> {
    let mut levels = vec![1, skill.max_level.div_ceil(2), skill.max_level];
    levels.dedup();
    levels
}

fn print_damage_table(creatures: &[&Creature], skills: &[&Skill], attack: u64) {
    let attacker = ActorStats::new(attack, 0, 1);
    println!();
    println!("== Damage (attack {attack}, no passives) ==");
    for skill in skills {
        for level in sample_levels(skill) {
            println!("{} lv {level} (+{}%)", skill.name, skill.effect_at(level));
            for creature in creatures {
                let defender = creature.combat_stats();
                let low = resolve_damage(&attacker, &defender, skill, level, &[], &mut ScriptedRng::constant(0.0));
                let high =
                    resolve_damage(&attacker, &defender, skill, level, &[], &mut ScriptedRng::constant(0.999_999));
                println!("  vs {:<25} {:>8} ..= {:<8}", creature.name, low.total, high.total);
            }
        }
    }
}
