//! Programmer-error surface for the battle engine.
//!
//! In-battle conditions (missing definitions, no valid target, turn cap
//! reached) are handled silently per the engine's contract and never appear
//! here. `BattleError` is reserved for precondition violations caught before
//! simulation starts.

use thiserror::Error;

use crate::log::ActorRef;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BattleError {
    #[error("actor {actor:?} has non-positive max_hp ({max_hp})")]
    NonPositiveMaxHp { actor: ActorRef, max_hp: i64 },

    #[error("actor {actor:?} has current_hp {current_hp} out of bounds [0, {max_hp}]")]
    HpOutOfBounds {
        actor: ActorRef,
        current_hp: i64,
        max_hp: i64,
    },

    #[error("actor {actor:?} has a negative action rate")]
    NegativeActionRate { actor: ActorRef },

    #[error("actor {actor:?} has formation slot {slot} outside 1..=6")]
    InvalidFormationSlot { actor: ActorRef, slot: u8 },

    #[error("actor {actor:?} has attack_count {attack_count} below the floor of 1")]
    AttackCountBelowFloor { actor: ActorRef, attack_count: f64 },

    #[error("no players supplied")]
    EmptyPlayers,

    #[error("no enemies supplied")]
    EmptyEnemies,
}
