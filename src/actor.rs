//! Passive combatant data.
//!
//! The caller constructs `Actor` from compiled stats before the engine is
//! invoked and owns the array it lives in; the engine mutates actors in
//! place but never reads the originating race/job/equipment data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::BattleError;
use crate::log::{ActorRef, Side};
use crate::skill_effects::{DamageChannel, SkillEffects};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub strength: i32,
    pub wisdom: i32,
    pub spirit: i32,
    pub vitality: i32,
    pub agility: i32,
    pub luck: i32,
}

/// Per-channel weights feeding the action-selection lottery.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionRates {
    pub attack: i32,
    pub priest_magic: i32,
    pub mage_magic: i32,
    pub breath: i32,
}

/// The mutable combat snapshot: everything the damage pipeline and timed
/// buffs read and adjust turn to turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatSnapshot {
    pub max_hp: i64,
    pub physical_attack_score: f64,
    pub magical_attack_score: f64,
    pub physical_defense_score: f64,
    pub magical_defense_score: f64,
    pub hit_score: f64,
    pub evasion_score: f64,
    pub critical_chance_percent: i32,
    pub attack_count: f64,
    pub magical_healing_score: f64,
    pub trap_removal_score: f64,
    pub additional_damage_score: f64,
    pub breath_damage_score: f64,
    pub is_martial_eligible: bool,
    /// Additive percent applied to the computed action-order speed; moved
    /// here rather than `Attributes.agility` since it is buff-driven and
    /// expires with its `TimedBuffInstance`.
    pub speed_bonus_percent: f64,
}

impl CombatSnapshot {
    /// Floored, clamped-to-at-least-one hit count for a burst.
    pub fn hit_count(&self) -> u32 {
        (self.attack_count.floor() as i64).max(1) as u32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusInstance {
    pub id: u8,
    pub remaining_turns: u32,
    pub source: Option<ActorRef>,
    pub stack_value: f64,
}

/// Additive channels a timed buff can touch, as plain fields rather than a
/// dynamic keyed lookup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatModifiers {
    pub max_hp: f64,
    pub physical_attack_score: f64,
    pub magical_attack_score: f64,
    pub physical_defense_score: f64,
    pub magical_defense_score: f64,
    pub hit_score: f64,
    pub evasion_score: f64,
    pub critical_chance_percent: f64,
    pub attack_count: f64,
    pub additional_damage_score: f64,
    pub breath_damage_score: f64,
    pub speed_bonus_percent: f64,
    /// Reapplied every turn the buff is active rather than once on apply.
    pub hit_score_additive_per_turn: f64,
    pub attack_count_percent_per_turn: f64,
    pub attack_percent_per_turn: f64,
    pub defense_percent_per_turn: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimedBuffInstance {
    pub id: u32,
    pub base_duration: u32,
    pub remaining_turns: u32,
    pub stat_modifiers: StatModifiers,
    pub source_skill_id: u16,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AttackHistory {
    pub first_hit_done: bool,
    pub consecutive_hits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resistances {
    pub physical: f64,
    pub magical: f64,
    pub breath: f64,
    pub per_spell: HashMap<u16, f64>,
}

impl Default for Resistances {
    fn default() -> Self {
        Resistances {
            physical: 1.0,
            magical: 1.0,
            breath: 1.0,
            per_spell: HashMap::new(),
        }
    }
}

impl Resistances {
    pub fn channel(&self, channel: DamageChannel) -> f64 {
        match channel {
            DamageChannel::Physical => self.physical,
            DamageChannel::Magical => self.magical,
            DamageChannel::Breath => self.breath,
        }
    }
}

/// Everything mutated turn-to-turn that is not the combat snapshot itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeState {
    pub action_rates: ActionRates,
    pub action_resources: HashMap<String, u32>,
    pub status_effects: Vec<StatusInstance>,
    pub timed_buffs: Vec<TimedBuffInstance>,
    pub barrier_charges: HashMap<DamageChannel, u32>,
    pub guard_barrier_charges: HashMap<DamageChannel, u32>,
    pub guard_active: bool,
    pub attack_history: AttackHistory,
    pub extra_actions_next_turn: u32,
    pub spell_charge_regen_usage: HashMap<u16, u32>,
    pub turns_since_necromancer: u32,
    /// Times each enemy special skill has already been used this battle,
    /// checked against `EnemySkillDefinition::uses_per_battle`.
    pub enemy_skill_uses: HashMap<u16, u32>,
    /// Times each `resurrection.actives` entry (keyed by its index) has
    /// already triggered this battle, checked against `max_triggers`.
    pub active_resurrection_uses: HashMap<usize, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub side: Side,
    pub slot: u8,
    pub party_member_id: Option<u8>,
    pub enemy_master_index: Option<u32>,
    pub name: String,
    pub level: i32,
    /// Ids into `EnemySkillDefinitions` this actor may use; meaningful for
    /// `Side::Enemy` only.
    pub enemy_skills: Vec<u16>,

    pub attributes: Attributes,
    pub snapshot: CombatSnapshot,
    pub runtime: RuntimeState,
    pub skill_effects: SkillEffects,
    pub resistances: Resistances,

    pub current_hp: i64,
}

impl Actor {
    pub fn actor_ref(&self, array_index: usize) -> ActorRef {
        match self.side {
            Side::Player => ActorRef::player(self.party_member_id.unwrap_or(array_index as u8 + 1)),
            Side::Enemy => ActorRef::enemy(array_index, self.enemy_master_index.unwrap_or(0)),
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.current_hp <= 0
    }

    pub fn is_front_row(&self) -> bool {
        self.slot < 2
    }

    pub fn hp_ratio(&self) -> f64 {
        if self.snapshot.max_hp <= 0 {
            0.0
        } else {
            self.current_hp as f64 / self.snapshot.max_hp as f64
        }
    }

    pub fn heal(&mut self, amount: i64) -> i64 {
        let before = self.current_hp;
        self.current_hp = (self.current_hp + amount).min(self.snapshot.max_hp);
        self.current_hp - before
    }

    pub fn damage(&mut self, amount: i64) -> i64 {
        let before = self.current_hp;
        self.current_hp = (self.current_hp - amount).max(0);
        before - self.current_hp
    }

    pub fn validate(&self, actor: ActorRef) -> Result<(), BattleError> {
        if self.snapshot.max_hp <= 0 {
            return Err(BattleError::NonPositiveMaxHp {
                actor,
                max_hp: self.snapshot.max_hp,
            });
        }
        if self.current_hp < 0 || self.current_hp > self.snapshot.max_hp {
            return Err(BattleError::HpOutOfBounds {
                actor,
                current_hp: self.current_hp,
                max_hp: self.snapshot.max_hp,
            });
        }
        let rates = &self.runtime.action_rates;
        if rates.attack < 0 || rates.priest_magic < 0 || rates.mage_magic < 0 || rates.breath < 0 {
            return Err(BattleError::NegativeActionRate { actor });
        }
        if !(1..=6).contains(&self.slot) {
            return Err(BattleError::InvalidFormationSlot {
                actor,
                slot: self.slot,
            });
        }
        if self.snapshot.attack_count < 1.0 {
            return Err(BattleError::AttackCountBelowFloor {
                actor,
                attack_count: self.snapshot.attack_count,
            });
        }
        Ok(())
    }
}
