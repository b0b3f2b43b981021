#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless demo driver for the Rune Defence round engine.
//!
//! Plays a JSON level to completion: a simulated clock ticks the
//! orchestrator, a kill clock stands in for towers by retiring the enemy
//! closest to the spawn point, and an auto-picker stands in for the
//! selection UI by drafting the first offer after every round.

mod config;

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use rune_defence_core::{Event, RuneId};
use rune_defence_system_draft::{CatalogError, RuneCatalog};
use rune_defence_system_rounds::{Orchestrator, Session};

use crate::config::{LevelFile, RuneFile};

/// Kill clock search radius, wide enough to always reach the population.
const KILL_RANGE: f32 = 10_000.0;

/// Plays a Rune Defence level headlessly and prints a per-round summary.
#[derive(Debug, Parser)]
#[command(name = "rune-defence")]
struct Args {
    /// Path to the level JSON file.
    #[arg(long)]
    level: PathBuf,
    /// Directory holding one `<id>.json` definition per rune.
    #[arg(long)]
    runes: PathBuf,
    /// Overrides the level's random seed policy with a fixed seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated milliseconds advanced per tick.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
    /// Simulated milliseconds between kill-clock shots.
    #[arg(long, default_value_t = 200)]
    kill_every_ms: u64,
    /// Abort if the level is still running after this much simulated time.
    #[arg(long, default_value_t = 600)]
    max_secs: u64,
}

/// Resolves rune definitions from a directory of JSON files, one per id.
struct DirCatalog {
    dir: PathBuf,
}

impl RuneCatalog for DirCatalog {
    fn resolve(&self, id: &RuneId) -> Result<rune_defence_core::RuneDef, CatalogError> {
        let path = self.dir.join(format!("{}.json", id.as_str()));
        let bytes = fs::read(&path).map_err(|_| CatalogError::NotFound(id.clone()))?;
        let file: RuneFile =
            serde_json::from_slice(&bytes).map_err(|error| CatalogError::Malformed {
                id: id.clone(),
                reason: error.to_string(),
            })?;
        file.into_def(id)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let raw = fs::read_to_string(&args.level)
        .with_context(|| format!("reading level file {}", args.level.display()))?;
    let file: LevelFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing level file {}", args.level.display()))?;
    let name = if file.display_name.is_empty() {
        args.level.display().to_string()
    } else {
        file.display_name.clone()
    };
    let plan = file.into_plan(args.seed);
    let catalog = DirCatalog {
        dir: args.runes.clone(),
    };

    let mut session = Session::new();
    let picker = session.bus.subscribe();
    let mut orchestrator = Orchestrator::new();
    orchestrator.begin(&plan, &catalog, &mut session);
    ensure!(
        orchestrator.is_running(),
        "level `{name}` has no playable rounds"
    );

    let dt = Duration::from_millis(args.tick_ms.max(1));
    let kill_every = Duration::from_millis(args.kill_every_ms.max(1));
    let limit = Duration::from_secs(args.max_secs);
    let mut until_kill = kill_every;
    let mut clock = Duration::ZERO;
    let mut spawned = 0usize;
    let mut rounds_cleared = 0usize;
    let mut credits = 0u64;
    let mut picks: Vec<String> = Vec::new();
    let mut events = Vec::new();

    while orchestrator.is_running() {
        ensure!(
            clock <= limit,
            "level `{name}` still running after {}s simulated; is the kill clock too slow?",
            args.max_secs
        );
        orchestrator.tick(dt, &mut session);
        clock += dt;

        until_kill = until_kill.saturating_sub(dt);
        if until_kill.is_zero() {
            until_kill = kill_every;
            let target = session
                .registry
                .closest(&session.store, plan.spawn_point, KILL_RANGE);
            if let Some(enemy) = target {
                session.retire_enemy(enemy);
            }
        }

        events.clear();
        session.bus.drain(picker, &mut events);
        for event in events.drain(..) {
            match event {
                Event::EnemySpawned { .. } => spawned += 1,
                Event::RoundRewardGranted { amount } => credits += u64::from(amount),
                Event::RoundEnded { round } => {
                    rounds_cleared += 1;
                    let offers = session.pool.offers_for_round(round);
                    match offers.first() {
                        Some(first) => {
                            let listed: Vec<&str> =
                                offers.iter().map(|def| def.name.as_str()).collect();
                            println!(
                                "round {round} cleared at {:.1}s; drafting `{}` from [{}]",
                                clock.as_secs_f32(),
                                first.name,
                                listed.join(", ")
                            );
                            let choice = first.id.clone();
                            picks.push(first.name.clone());
                            session.select_rune(&choice);
                        }
                        None => {
                            println!(
                                "round {round} cleared at {:.1}s; no draft offered",
                                clock.as_secs_f32()
                            );
                            session.skip_selection();
                        }
                    }
                }
                Event::RuneSelected { .. } | Event::RuneSelectionCompleted => {}
            }
        }
    }

    let enemy_speed = session.stats.enemy_speed();
    println!(
        "level `{name}` complete: {rounds_cleared} rounds, {spawned} enemies, {credits} credits"
    );
    if !picks.is_empty() {
        println!("drafted: {}", picks.join(", "));
    }
    println!(
        "enemy speed aggregate: x{:.2} {:+.2}",
        enemy_speed.multiplier(),
        enemy_speed.additive()
    );
    Ok(())
}
