//! Minimal actor/context builders shared by unit tests across modules.

use std::collections::HashMap;

use crate::actor::{ActionRates, Actor, Attributes, CombatSnapshot, Resistances, RuntimeState};
use crate::context::BattleContext;
use crate::definitions::{EnemySkillDefinitions, SkillDefinitions, StatusDefinitions};
use crate::log::Side;
use crate::prng::{Prng, PrngPolicy};
use crate::skill_effects::SkillEffects;

pub fn snapshot(max_hp: i64) -> CombatSnapshot {
    CombatSnapshot {
        max_hp,
        physical_attack_score: 50.0,
        magical_attack_score: 30.0,
        physical_defense_score: 20.0,
        magical_defense_score: 20.0,
        hit_score: 80.0,
        evasion_score: 10.0,
        critical_chance_percent: 5,
        attack_count: 1.0,
        magical_healing_score: 0.0,
        trap_removal_score: 0.0,
        additional_damage_score: 0.0,
        breath_damage_score: 0.0,
        is_martial_eligible: false,
        speed_bonus_percent: 0.0,
    }
}

pub fn actor(side: Side, slot: u8, party_member_id: Option<u8>, name: &str) -> Actor {
    Actor {
        side,
        slot,
        party_member_id,
        enemy_master_index: if side == Side::Enemy { Some(0) } else { None },
        name: name.to_string(),
        level: 1,
        enemy_skills: Vec::new(),
        attributes: Attributes::default(),
        snapshot: snapshot(100),
        runtime: RuntimeState {
            action_rates: ActionRates {
                attack: 10,
                ..Default::default()
            },
            ..Default::default()
        },
        skill_effects: SkillEffects::with_defaults(),
        resistances: Resistances::default(),
        current_hp: 100,
    }
}

/// Owns every array `BattleContext` borrows from, so tests can build one
/// fixture and mint contexts from it repeatedly.
pub struct Fixture {
    pub players: Vec<Actor>,
    pub enemies: Vec<Actor>,
    pub status_definitions: StatusDefinitions,
    pub skill_definitions: SkillDefinitions,
    pub enemy_skill_definitions: EnemySkillDefinitions,
    pub rng: Prng,
    pub policy: PrngPolicy,
}

impl Fixture {
    pub fn duel() -> Self {
        Fixture {
            players: vec![actor(Side::Player, 1, Some(1), "hero")],
            enemies: vec![actor(Side::Enemy, 1, None, "slime")],
            status_definitions: HashMap::new(),
            skill_definitions: HashMap::new(),
            enemy_skill_definitions: HashMap::new(),
            rng: Prng::new(1),
            policy: PrngPolicy::default(),
        }
    }

    pub fn context(&mut self) -> BattleContext<'_> {
        BattleContext::new(
            &mut self.players,
            &mut self.enemies,
            &self.status_definitions,
            &self.skill_definitions,
            &self.enemy_skill_definitions,
            &mut self.rng,
            self.policy,
        )
    }
}
