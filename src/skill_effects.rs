//! The aggregated, per-actor, read-only-during-battle skill effect bundle.
//!
//! `SkillEffects` is a flat product of substructs compiled once by the
//! caller's skill-effect compiler before battle starts. The engine never
//! mutates it; chain-suppression and similar per-turn flags live on
//! `Actor`'s runtime state instead.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::log::ActorRef;
use crate::timed_buffs::TimedBuffDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageChannel {
    Physical,
    Magical,
    Breath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionTrigger {
    SelfDamagedPhysical,
    SelfDamagedMagical,
    SelfEvadePhysical,
    AllyDamagedPhysical,
    AllyDefeated,
    SelfKilledEnemy,
    AllyMagicAttack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionTargetMode {
    Attacker,
    Killer,
    RandomEnemy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReactionDefinition {
    pub trigger: ReactionTrigger,
    pub target_mode: ReactionTargetMode,
    pub base_chance_percent: i32,
    pub attack_count_multiplier: f64,
    pub critical_chance_percent_multiplier: f64,
    pub accuracy_multiplier: f64,
    pub damage_type: DamageChannel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpecialAttackDefinition {
    pub preemptive: bool,
    pub chance_percent: i32,
    pub damage_multiplier: f64,
    pub hit_count_override: Option<u32>,
    pub damage_type: DamageChannel,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerChannel {
    pub physical: f64,
    pub magical: f64,
    pub breath: f64,
}

impl PerChannel {
    pub fn identity() -> Self {
        PerChannel {
            physical: 1.0,
            magical: 1.0,
            breath: 1.0,
        }
    }

    pub fn get(&self, channel: DamageChannel) -> f64 {
        match channel {
            DamageChannel::Physical => self.physical,
            DamageChannel::Magical => self.magical,
            DamageChannel::Breath => self.breath,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombatEffects {
    pub first_strike: bool,
    pub action_order_shuffle: bool,
    pub action_order_shuffle_enemy: bool,
    pub action_order_multiplier: f64,
    pub parry_enabled: bool,
    pub parry_bonus_percent: f64,
    pub shield_block_enabled: bool,
    pub shield_block_bonus_percent: f64,
    pub reactions: Vec<ReactionDefinition>,
    pub special_attacks: Vec<SpecialAttackDefinition>,
    pub extra_actions: u32,
    pub next_turn_extra_actions: u32,
    pub barrier_charges: HashMap<DamageChannel, u32>,
}

impl CombatEffects {
    pub fn with_defaults() -> Self {
        CombatEffects {
            action_order_multiplier: 1.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageEffects {
    pub dealt: PerChannel,
    pub taken: PerChannel,
    pub critical_percent: f64,
    pub critical_multiplier: f64,
    pub critical_taken_multiplier: f64,
}

impl Default for DamageEffects {
    fn default() -> Self {
        DamageEffects {
            dealt: PerChannel::identity(),
            taken: PerChannel::identity(),
            critical_percent: 0.0,
            critical_multiplier: 1.0,
            critical_taken_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverCondition {
    None,
    AllyHpBelow50,
}

impl Default for CoverCondition {
    fn default() -> Self {
        CoverCondition::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiscEffects {
    pub end_of_turn_healing_percent: f64,
    pub end_of_turn_self_hp_percent: f64,
    pub targeting_weight: f64,
    pub cover_rows_behind: bool,
    pub cover_condition: CoverCondition,
    pub allow_friendly_targets: bool,
    pub party_protected_targets: Vec<ActorRef>,
    pub party_hostile_targets: Vec<ActorRef>,
    pub retreat_chance_percent: i32,
    pub dodge_cap_max: f64,
}

impl MiscEffects {
    pub fn with_defaults() -> Self {
        MiscEffects {
            targeting_weight: 1.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChargeRecovery {
    pub channel_or_spell: u16,
    pub base_chance_percent: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegenRule {
    pub interval: u32,
    pub amount: u32,
    pub cap: u32,
    pub max_triggers: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChargeModifier {
    pub channel_or_spell: u16,
    pub regen: Option<RegenRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellEffects {
    pub charge_recoveries: Vec<ChargeRecovery>,
    pub charge_modifiers: Vec<ChargeModifier>,
    pub breath_extra_charges: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RescueCapability {
    pub min_level: i32,
    pub requires_priest_magic: bool,
    pub guaranteed: bool,
    pub revive_hp_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HpScale {
    Percent(f64),
    MaxHp5Percent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActiveResurrection {
    pub chance_percent: i32,
    pub hp_scale: HpScale,
    pub max_triggers: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResurrectionEffects {
    pub rescue_capabilities: Vec<RescueCapability>,
    pub necromancer_interval: Option<u32>,
    pub actives: Vec<ActiveResurrection>,
}

/// The full aggregated bundle, compiled once per actor before battle and
/// treated as immutable for its duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillEffects {
    pub combat: CombatEffects,
    pub damage: DamageEffects,
    pub misc: MiscEffects,
    pub spell: SpellEffects,
    pub resurrection: ResurrectionEffects,
    pub timed_buffs: Vec<TimedBuffDefinition>,
}

impl SkillEffects {
    pub fn with_defaults() -> Self {
        SkillEffects {
            combat: CombatEffects::with_defaults(),
            damage: DamageEffects::default(),
            misc: MiscEffects::with_defaults(),
            spell: SpellEffects::default(),
            resurrection: ResurrectionEffects::default(),
            timed_buffs: Vec::new(),
        }
    }
}
