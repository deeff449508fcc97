//! CLI entry point for the battle engine.

use std::path::PathBuf;
use std::time::Instant;

use battle_engine::batch::{run_and_aggregate_battles, BatchScenario};
use battle_engine::scenario::Scenario;
use battle_engine::turn_loop::run_battle;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "run_battle")]
#[command(version = "1.0")]
#[command(about = "Run a deterministic turn-based battle from a scenario file", long_about = None)]
struct Args {
    /// Path to the scenario file (JSON: players, enemies, definitions, seed)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Number of battles to run. 1 prints the full log; more than 1 prints
    /// an aggregate over `--count` runs seeded off the scenario's seed.
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Use the parallel batch runner when `--count` is greater than 1.
    #[arg(short, long, default_value = "false")]
    parallel: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Show timing information
    #[arg(short, long, default_value = "false")]
    timing: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let scenario = match Scenario::from_file(&args.scenario) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading scenario: {}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();

    if args.count <= 1 {
        let log = match run_battle(
            scenario.players.clone(),
            scenario.enemies.clone(),
            &scenario.status_defs,
            &scenario.skill_defs,
            &scenario.enemy_skill_defs,
            battle_engine::Prng::new(scenario.seed),
            scenario.policy(),
        ) {
            Ok(log) => log,
            Err(e) => {
                eprintln!("Battle rejected: {}", e);
                std::process::exit(1);
            }
        };
        let elapsed = start.elapsed();

        match args.output {
            OutputFormat::Text => {
                println!("=== Battle Result ===");
                println!("Outcome: {}", outcome_name(log.outcome));
                println!("Turns: {}", log.turns);
                println!("Log entries: {}", log.entries.len());
                if args.timing {
                    println!("Elapsed: {:.3}ms", elapsed.as_secs_f64() * 1000.0);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&log).unwrap());
            }
        }
        return;
    }

    let scenario_refs = BatchScenario {
        players: &scenario.players,
        enemies: &scenario.enemies,
        status_definitions: &scenario.status_defs,
        skill_definitions: &scenario.skill_defs,
        enemy_skill_definitions: &scenario.enemy_skill_defs,
        policy: scenario.policy(),
    };
    let aggregate = run_and_aggregate_battles(&scenario_refs, scenario.seed, args.count, args.parallel);
    let elapsed = start.elapsed();

    match args.output {
        OutputFormat::Text => {
            println!("=== Battle Batch Results ===");
            println!("Runs: {}", aggregate.runs);
            println!("Victories: {} ({:.1}%)", aggregate.victories, aggregate.win_rate * 100.0);
            println!("Defeats: {}", aggregate.defeats);
            println!("Retreats: {}", aggregate.retreats);
            println!("Avg turns: {:.2} (min {}, max {})", aggregate.avg_turns, aggregate.min_turns, aggregate.max_turns);
            if args.timing {
                println!();
                println!("Total time: {:.3}s", elapsed.as_secs_f64());
                println!("Per battle: {:.3}ms", elapsed.as_secs_f64() * 1000.0 / args.count as f64);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&aggregate).unwrap());
        }
    }
}

fn outcome_name(outcome: i32) -> &'static str {
    match outcome {
        battle_engine::log::OUTCOME_VICTORY => "victory",
        battle_engine::log::OUTCOME_DEFEAT => "defeat",
        _ => "retreat",
    }
}
