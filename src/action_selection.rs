//! Per-turn action candidate selection.

use serde::{Deserialize, Serialize};

use crate::context::BattleContext;
use crate::log::{ActorRef, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Attack,
    PriestMagic,
    MageMagic,
    Breath,
    Defend,
    EnemySpecialSkill(u16),
}

fn spell_available(ctx: &BattleContext, actor_ref: ActorRef, channel_key: &str) -> bool {
    let actor = match ctx.actor(actor_ref) {
        Some(a) => a,
        None => return false,
    };
    actor
        .runtime
        .action_resources
        .get(channel_key)
        .copied()
        .unwrap_or(0)
        > 0
}

/// Enemy special-skill candidates whose uses aren't exhausted, whose
/// chance roll succeeds, and whose preconditions (a living target exists)
/// are satisfied.
fn usable_enemy_special(ctx: &mut BattleContext, actor_ref: ActorRef) -> Option<u16> {
    let (side, idx) = ctx.resolve(actor_ref)?;
    if side != Side::Enemy {
        return None;
    }
    let skill_ids = ctx.enemies[idx].enemy_skills.clone();
    for id in skill_ids {
        let def = match ctx.enemy_skill_definitions.get(&id) {
            Some(d) => d.clone(),
            None => continue,
        };
        let used = ctx.enemies[idx]
            .runtime
            .enemy_skill_uses
            .get(&id)
            .copied()
            .unwrap_or(0);
        if used >= def.uses_per_battle {
            continue;
        }
        if ctx.players.iter().all(|p| p.is_defeated()) {
            continue;
        }
        if ctx.rng.percent_chance(def.chance_percent) {
            return Some(id);
        }
    }
    None
}

/// Draw a single weighted lottery over the four non-zero action-rate
/// channels, returning candidates in the canonical fallback order starting
/// from the winner.
fn lottery_candidates(ctx: &mut BattleContext, actor_ref: ActorRef) -> Vec<ActionKind> {
    let actor = match ctx.actor(actor_ref) {
        Some(a) => a,
        None => return vec![ActionKind::Defend],
    };
    let rates = actor.runtime.action_rates;
    let breathless = actor.snapshot.breath_damage_score <= 0.0;
    let no_priest = !spell_available(ctx, actor_ref, "priestMagic");
    let no_mage = !spell_available(ctx, actor_ref, "mageMagic");

    let priest = if no_priest { 0 } else { rates.priest_magic.max(0) };
    let mage = if no_mage { 0 } else { rates.mage_magic.max(0) };
    let physical = rates.attack.max(0);
    let breath = if breathless { 0 } else { rates.breath.max(0) };

    let channels = [
        (ActionKind::PriestMagic, priest),
        (ActionKind::MageMagic, mage),
        (ActionKind::Attack, physical),
        (ActionKind::Breath, breath),
    ];

    let total: i64 = channels.iter().map(|(_, w)| *w as i64).sum();
    if total <= 0 {
        return vec![ActionKind::Defend];
    }

    let roll = ctx.rng.int_in_range(1, total);
    let mut acc = 0i64;
    let mut winner_idx = channels.len() - 1;
    for (i, (_, w)) in channels.iter().enumerate() {
        acc += *w as i64;
        if roll <= acc {
            winner_idx = i;
            break;
        }
    }

    channels[winner_idx..]
        .iter()
        .filter(|(_, w)| *w > 0)
        .map(|(kind, _)| *kind)
        .collect()
}

fn precondition_met(ctx: &BattleContext, actor_ref: ActorRef, kind: ActionKind) -> bool {
    let opposing = match actor_ref.side() {
        Side::Player => Side::Enemy,
        Side::Enemy => Side::Player,
    };
    let has_living_target = ctx.side_array(opposing).iter().any(|a| !a.is_defeated());
    match kind {
        ActionKind::Attack | ActionKind::Breath => has_living_target,
        ActionKind::PriestMagic => spell_available(ctx, actor_ref, "priestMagic"),
        ActionKind::MageMagic => spell_available(ctx, actor_ref, "mageMagic") && has_living_target,
        ActionKind::Defend => true,
        ActionKind::EnemySpecialSkill(_) => has_living_target,
    }
}

/// Ordered, never-empty list of action candidates for one actor's turn.
pub fn select_action_candidates(ctx: &mut BattleContext, actor_ref: ActorRef) -> Vec<ActionKind> {
    if actor_ref.is_enemy() {
        if let Some(id) = usable_enemy_special(ctx, actor_ref) {
            return vec![ActionKind::EnemySpecialSkill(id)];
        }
    }

    let candidates = lottery_candidates(ctx, actor_ref);
    let filtered: Vec<ActionKind> = candidates
        .into_iter()
        .filter(|k| precondition_met(ctx, actor_ref, *k))
        .collect();

    if filtered.is_empty() {
        vec![ActionKind::Defend]
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn defends_when_all_rates_zero() {
        let mut fx = Fixture::duel();
        let actor_ref = fx.players[0].actor_ref(0);
        let mut ctx = fx.context();
        ctx.players[0].runtime.action_rates = crate::actor::ActionRates::default();
        let candidates = select_action_candidates(&mut ctx, actor_ref);
        assert_eq!(candidates, vec![ActionKind::Defend]);
    }

    #[test]
    fn attacks_when_only_attack_rate_set() {
        let mut fx = Fixture::duel();
        let actor_ref = fx.players[0].actor_ref(0);
        let mut ctx = fx.context();
        ctx.players[0].runtime.action_rates = crate::actor::ActionRates {
            attack: 10,
            ..Default::default()
        };
        let candidates = select_action_candidates(&mut ctx, actor_ref);
        assert_eq!(candidates, vec![ActionKind::Attack]);
    }
}
