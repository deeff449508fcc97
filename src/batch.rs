//! Running many battles from one scenario and folding the results.

use std::sync::Once;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::definitions::{EnemySkillDefinitions, SkillDefinitions, StatusDefinitions};
use crate::error::BattleError;
use crate::log::{BattleLog, OUTCOME_DEFEAT, OUTCOME_RETREAT, OUTCOME_VICTORY};
use crate::prng::{Prng, PrngPolicy};
use crate::turn_loop::run_battle;

static INIT: Once = Once::new();

fn init_thread_pool() {
    INIT.call_once(|| {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .min(8);
        let _ = ThreadPoolBuilder::new().num_threads(num_threads).build_global();
    });
}

/// Derive a per-run seed from a base seed and run index so parallel and
/// sequential runs over the same `(seed, count)` produce the same set of
/// battles regardless of which mode ran them.
fn seed_for_run(base_seed: u64, index: usize) -> u64 {
    base_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(index as u64)
}

/// One battle's fixed inputs, reused across every run in a batch; only the
/// seed varies run to run.
pub struct BatchScenario<'a> {
    pub players: &'a [Actor],
    pub enemies: &'a [Actor],
    pub status_definitions: &'a StatusDefinitions,
    pub skill_definitions: &'a SkillDefinitions,
    pub enemy_skill_definitions: &'a EnemySkillDefinitions,
    pub policy: PrngPolicy,
}

fn run_one(scenario: &BatchScenario, seed: u64) -> Result<BattleLog, BattleError> {
    run_battle(
        scenario.players.to_vec(),
        scenario.enemies.to_vec(),
        scenario.status_definitions,
        scenario.skill_definitions,
        scenario.enemy_skill_definitions,
        Prng::new(seed),
        scenario.policy,
    )
}

/// Run `count` battles in parallel across a bounded thread pool, each from a
/// freshly cloned roster and a seed derived from `base_seed`.
pub fn run_battles_parallel(scenario: &BatchScenario, base_seed: u64, count: usize) -> Vec<Result<BattleLog, BattleError>> {
    init_thread_pool();
    let num_cores = num_cpus::get().max(1);
    let chunk_size = (count / num_cores).max(1);

    (0..count)
        .into_par_iter()
        .with_min_len(chunk_size.min(100))
        .map(|i| run_one(scenario, seed_for_run(base_seed, i)))
        .collect()
}

/// Run `count` battles one after another. Lower memory footprint than the
/// parallel path; useful for small counts or when a caller wants strict
/// run-order determinism.
pub fn run_battles_sequential(scenario: &BatchScenario, base_seed: u64, count: usize) -> Vec<Result<BattleLog, BattleError>> {
    (0..count)
        .map(|i| run_one(scenario, seed_for_run(base_seed, i)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BattleAggregate {
    pub runs: u32,
    pub victories: u32,
    pub defeats: u32,
    pub retreats: u32,
    pub win_rate: f64,
    pub avg_turns: f64,
    pub min_turns: u32,
    pub max_turns: u32,
}

impl BattleAggregate {
    pub fn from_logs(logs: &[BattleLog]) -> Self {
        if logs.is_empty() {
            return Self::default();
        }
        let runs = logs.len() as u32;
        let victories = logs.iter().filter(|l| l.outcome == OUTCOME_VICTORY).count() as u32;
        let defeats = logs.iter().filter(|l| l.outcome == OUTCOME_DEFEAT).count() as u32;
        let retreats = logs.iter().filter(|l| l.outcome == OUTCOME_RETREAT).count() as u32;
        let turns: Vec<u32> = logs.iter().map(|l| l.turns).collect();
        let avg_turns = turns.iter().map(|t| *t as f64).sum::<f64>() / runs as f64;
        let min_turns = *turns.iter().min().unwrap();
        let max_turns = *turns.iter().max().unwrap();

        BattleAggregate {
            runs,
            victories,
            defeats,
            retreats,
            win_rate: victories as f64 / runs as f64,
            avg_turns,
            min_turns,
            max_turns,
        }
    }
}

/// Run a batch either in parallel or sequentially, discard any battle that
/// fails validation, and fold the rest into an aggregate. Used by the CLI's
/// `--count` mode.
pub fn run_and_aggregate_battles(scenario: &BatchScenario, base_seed: u64, count: usize, parallel: bool) -> BattleAggregate {
    let results = if parallel {
        run_battles_parallel(scenario, base_seed, count)
    } else {
        run_battles_sequential(scenario, base_seed, count)
    };
    let logs: Vec<BattleLog> = results.into_iter().filter_map(Result::ok).collect();
    BattleAggregate::from_logs(&logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Side;
    use crate::test_support::actor;

    fn fixture() -> (Vec<Actor>, Vec<Actor>, StatusDefinitions, SkillDefinitions, EnemySkillDefinitions) {
        let mut enemy = actor(Side::Enemy, 1, None, "training dummy");
        enemy.current_hp = 0;
        let player = actor(Side::Player, 1, Some(1), "hero");
        (vec![player], vec![enemy], StatusDefinitions::default(), SkillDefinitions::default(), EnemySkillDefinitions::default())
    }

    #[test]
    fn sequential_and_parallel_batches_agree_on_outcome_counts() {
        let (players, enemies, status_defs, skill_defs, enemy_skill_defs) = fixture();
        let scenario = BatchScenario {
            players: &players,
            enemies: &enemies,
            status_definitions: &status_defs,
            skill_definitions: &skill_defs,
            enemy_skill_definitions: &enemy_skill_defs,
            policy: PrngPolicy::default(),
        };

        let sequential = run_battles_sequential(&scenario, 99, 10);
        let parallel = run_battles_parallel(&scenario, 99, 10);

        let seq_agg = BattleAggregate::from_logs(&sequential.into_iter().filter_map(Result::ok).collect::<Vec<_>>());
        let par_agg = BattleAggregate::from_logs(&parallel.into_iter().filter_map(Result::ok).collect::<Vec<_>>());

        assert_eq!(seq_agg.runs, 10);
        assert_eq!(seq_agg.victories, 10);
        assert_eq!(seq_agg.runs, par_agg.runs);
        assert_eq!(seq_agg.victories, par_agg.victories);
    }

    #[test]
    fn empty_batch_yields_default_aggregate() {
        let agg = BattleAggregate::from_logs(&[]);
        assert_eq!(agg.runs, 0);
        assert_eq!(agg.win_rate, 0.0);
    }
}
