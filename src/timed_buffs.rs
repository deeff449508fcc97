//! Timed buffs: battle-start/every-turn triggers, stat-modifier apply and
//! expiry, and the four per-turn additive aggregators.

use serde::{Deserialize, Serialize};

use crate::actor::{Actor, StatModifiers, TimedBuffInstance};
use crate::context::BattleContext;
use crate::log::{ActorRef, Declaration, DeclarationKind, Effect, EffectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuffTrigger {
    BattleStart,
    EveryTurn,
}

/// A buff definition an actor carries, compiled alongside the rest of its
/// `SkillEffects`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimedBuffDefinition {
    pub id: u32,
    pub trigger: BuffTrigger,
    pub base_duration: u32,
    pub stat_modifiers: StatModifiers,
    pub source_skill_id: u16,
}

fn add_modifiers(snapshot: &mut crate::actor::CombatSnapshot, m: &StatModifiers, sign: f64) {
    snapshot.max_hp = (snapshot.max_hp as f64 + sign * m.max_hp).max(1.0) as i64;
    snapshot.physical_attack_score += sign * m.physical_attack_score;
    snapshot.magical_attack_score += sign * m.magical_attack_score;
    snapshot.physical_defense_score += sign * m.physical_defense_score;
    snapshot.magical_defense_score += sign * m.magical_defense_score;
    snapshot.hit_score += sign * m.hit_score;
    snapshot.evasion_score += sign * m.evasion_score;
    snapshot.critical_chance_percent = (snapshot.critical_chance_percent as f64 + sign * m.critical_chance_percent) as i32;
    snapshot.attack_count += sign * m.attack_count;
    snapshot.additional_damage_score += sign * m.additional_damage_score;
    snapshot.breath_damage_score += sign * m.breath_damage_score;
    snapshot.speed_bonus_percent += sign * m.speed_bonus_percent;
}

fn apply_per_turn_aggregators(snapshot: &mut crate::actor::CombatSnapshot, m: &StatModifiers) {
    snapshot.hit_score += m.hit_score_additive_per_turn;
    snapshot.attack_count *= 1.0 + m.attack_count_percent_per_turn / 100.0;
    snapshot.physical_attack_score *= 1.0 + m.attack_percent_per_turn / 100.0;
    snapshot.magical_attack_score *= 1.0 + m.attack_percent_per_turn / 100.0;
    snapshot.physical_defense_score *= 1.0 + m.defense_percent_per_turn / 100.0;
    snapshot.magical_defense_score *= 1.0 + m.defense_percent_per_turn / 100.0;
}

fn apply_one(actor: &mut Actor, def: &TimedBuffDefinition) {
    add_modifiers(&mut actor.snapshot, &def.stat_modifiers, 1.0);
    actor.runtime.timed_buffs.push(TimedBuffInstance {
        id: def.id,
        base_duration: def.base_duration,
        remaining_turns: def.base_duration,
        stat_modifiers: def.stat_modifiers,
        source_skill_id: def.source_skill_id,
    });
}

/// Apply every definition matching `trigger` carried on each living actor's
/// own `SkillEffects.timed_buffs`.
pub fn trigger_buffs(ctx: &mut BattleContext, trigger: BuffTrigger) {
    let refs: Vec<ActorRef> = ctx
        .players
        .iter()
        .enumerate()
        .map(|(i, a)| a.actor_ref(i))
        .chain(ctx.enemies.iter().enumerate().map(|(i, a)| a.actor_ref(i)))
        .collect();

    for actor_ref in refs {
        let Some(actor) = ctx.actor_mut(actor_ref) else { continue };
        if actor.is_defeated() {
            continue;
        }
        let defs: Vec<TimedBuffDefinition> = actor
            .skill_effects
            .timed_buffs
            .iter()
            .copied()
            .filter(|d| d.trigger == trigger)
            .collect();
        for def in &defs {
            apply_one(actor, def);
        }
    }
}

/// Decrement every active buff's remaining turns, reapplying per-turn
/// additive aggregators for buffs still active, and expiring (subtracting
/// the modifier, logging `buffExpire`) anything that reaches zero.
pub fn tick_all_timed_buffs(ctx: &mut BattleContext) {
    let refs: Vec<ActorRef> = ctx
        .players
        .iter()
        .enumerate()
        .map(|(i, a)| a.actor_ref(i))
        .chain(ctx.enemies.iter().enumerate().map(|(i, a)| a.actor_ref(i)))
        .collect();

    for actor_ref in refs {
        let Some(actor) = ctx.actor_mut(actor_ref) else { continue };
        if actor.is_defeated() {
            continue;
        }

        let mut expired = Vec::new();
        for buff in &mut actor.runtime.timed_buffs {
            apply_per_turn_aggregators(&mut actor.snapshot, &buff.stat_modifiers);
            buff.remaining_turns = buff.remaining_turns.saturating_sub(1);
            if buff.remaining_turns == 0 {
                expired.push(*buff);
            }
        }
        for buff in &expired {
            add_modifiers(&mut actor.snapshot, &buff.stat_modifiers, -1.0);
        }
        actor.runtime.timed_buffs.retain(|b| b.remaining_turns > 0);

        if !expired.is_empty() {
            let effects = expired
                .iter()
                .map(|b| Effect::new(EffectKind::BuffExpire).target(actor_ref).extra(b.id as i64))
                .collect();
            ctx.append(Some(actor_ref), Declaration::new(DeclarationKind::Defend), effects);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn attack_up(id: u32, base_duration: u32) -> TimedBuffDefinition {
        TimedBuffDefinition {
            id,
            trigger: BuffTrigger::BattleStart,
            base_duration,
            stat_modifiers: StatModifiers {
                physical_attack_score: 10.0,
                ..Default::default()
            },
            source_skill_id: 7,
        }
    }

    #[test]
    fn battle_start_buff_raises_snapshot() {
        let mut fx = Fixture::duel();
        fx.players[0].skill_effects.timed_buffs.push(attack_up(1, 2));
        let mut ctx = fx.context();
        let before = ctx.players[0].snapshot.physical_attack_score;
        trigger_buffs(&mut ctx, BuffTrigger::BattleStart);
        assert_eq!(ctx.players[0].snapshot.physical_attack_score, before + 10.0);
        assert_eq!(ctx.players[0].runtime.timed_buffs.len(), 1);
    }

    #[test]
    fn buff_expires_and_reverts_modifier() {
        let mut fx = Fixture::duel();
        fx.players[0].skill_effects.timed_buffs.push(attack_up(1, 1));
        let mut ctx = fx.context();
        let before = ctx.players[0].snapshot.physical_attack_score;
        trigger_buffs(&mut ctx, BuffTrigger::BattleStart);
        tick_all_timed_buffs(&mut ctx);
        assert_eq!(ctx.players[0].snapshot.physical_attack_score, before);
        assert!(ctx.players[0].runtime.timed_buffs.is_empty());
    }
}
