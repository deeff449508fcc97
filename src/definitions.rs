//! Read-only master-data records the engine consults but never mutates.
//! Loading these from files is the caller's job; the engine only ever
//! receives the finished maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::skill_effects::DamageChannel;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusEffectDefinition {
    pub id: u8,
    pub name: String,
    pub duration_turns: Option<u32>,
    pub tick_damage_percent: Option<f64>,
    pub action_locked: bool,
    pub stackable: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: u16,
    pub name: String,
    /// Free-form description of the compiled effects this skill produces;
    /// the engine never reparses this, it just renders it for logs.
    pub effect_summary: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemySkillKind {
    Physical,
    Breath,
    Status,
    Heal,
    Buff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyTargeting {
    SingleOpponent,
    AllOpponents,
    SingleAlly,
    AllAllies,
    Self_,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuffType {
    AttackUp,
    DefenseUp,
    SpeedUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemySkillDefinition {
    pub id: u16,
    pub name: String,
    pub kind: EnemySkillKind,
    pub targeting: EnemyTargeting,
    pub chance_percent: i32,
    pub uses_per_battle: u32,
    pub damage_dealt_multiplier: Option<f64>,
    pub hit_count: Option<u32>,
    pub element: Option<DamageChannel>,
    pub status_id: Option<u8>,
    pub status_chance: Option<i32>,
    pub heal_percent: Option<f64>,
    /// Heal only the caster rather than the lowest-HP-ratio ally.
    pub heal_self_only: bool,
    pub buff_type: Option<BuffType>,
    pub buff_multiplier: Option<f64>,
}

pub type StatusDefinitions = HashMap<u8, StatusEffectDefinition>;
pub type SkillDefinitions = HashMap<u16, SkillDefinition>;
pub type EnemySkillDefinitions = HashMap<u16, EnemySkillDefinition>;
