//! Offensive, healing, and status target selection.

use crate::context::BattleContext;
use crate::log::{ActorRef, Effect, EffectKind, Side};
use crate::skill_effects::CoverCondition;

fn opposing(side: Side) -> Side {
    match side {
        Side::Player => Side::Enemy,
        Side::Enemy => Side::Player,
    }
}

fn weighted_pick(ctx: &mut BattleContext, candidates: &[ActorRef]) -> Option<ActorRef> {
    if candidates.is_empty() {
        return None;
    }
    let weights: Vec<f64> = candidates
        .iter()
        .map(|r| {
            ctx.actor(*r)
                .map(|a| a.skill_effects.misc.targeting_weight.max(0.0))
                .unwrap_or(0.0)
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let idx = ctx.rng.int_in_range(0, candidates.len() as i64 - 1) as usize;
        return Some(candidates[idx]);
    }
    let roll = ctx.rng.next_u64() as f64 / (u64::MAX as f64 + 1.0) * total;
    let mut acc = 0.0;
    for (r, w) in candidates.iter().zip(weights.iter()) {
        acc += w;
        if roll < acc {
            return Some(*r);
        }
    }
    candidates.last().copied()
}

fn same_side_filtered(ctx: &BattleContext, actor_ref: ActorRef) -> Vec<ActorRef> {
    let actor = match ctx.actor(actor_ref) {
        Some(a) => a,
        None => return Vec::new(),
    };
    let misc = &actor.skill_effects.misc;
    if !misc.allow_friendly_targets {
        return Vec::new();
    }
    let hostile = misc.party_hostile_targets.clone();
    let protected = misc.party_protected_targets.clone();
    let side = actor_ref.side();
    ctx.side_array(side)
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated())
        .map(|(i, a)| a.actor_ref(i))
        .filter(|r| *r != actor_ref)
        .filter(|r| {
            if !hostile.is_empty() {
                hostile.contains(r)
            } else {
                !protected.contains(r)
            }
        })
        .collect()
}

/// Picks one `(side, arrayIndex)` for an offensive action, honoring forced
/// sacrifice overrides and cover redirection ahead of the weighted draw.
/// Discards the `cover` effect; callers that need to log it should use
/// [`select_offensive_target_with_cover`] instead.
pub fn select_offensive_target(ctx: &mut BattleContext, actor_ref: ActorRef) -> Option<ActorRef> {
    select_offensive_target_with_cover(ctx, actor_ref).map(|(target, _)| target)
}

/// Like [`select_offensive_target`] but also returns the `cover` effect to
/// splice into the action's own effect list when a redirection occurred.
pub fn select_offensive_target_with_cover(
    ctx: &mut BattleContext,
    actor_ref: ActorRef,
) -> Option<(ActorRef, Option<Effect>)> {
    let defender_side = opposing(actor_ref.side());
    if let Some(forced) = ctx.take_sacrifice_target(defender_side) {
        return Some((forced, None));
    }

    let mut pool: Vec<ActorRef> = ctx
        .side_array(defender_side)
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated())
        .map(|(i, a)| a.actor_ref(i))
        .collect();
    pool.extend(same_side_filtered(ctx, actor_ref));

    let drawn = weighted_pick(ctx, &pool)?;
    Some(redirect_for_cover(ctx, drawn))
}

/// If `drawn` sits in a back row, look for a front-row same-side cover
/// actor whose condition is satisfied and redirect to it, returning a
/// `cover` effect bound to the cover actor and the original target.
fn redirect_for_cover(ctx: &mut BattleContext, drawn: ActorRef) -> (ActorRef, Option<Effect>) {
    let (drawn_side, drawn_idx) = match ctx.resolve(drawn) {
        Some(v) => v,
        None => return (drawn, None),
    };
    let is_back_row = !ctx.side_array(drawn_side)[drawn_idx].is_front_row();
    if !is_back_row {
        return (drawn, None);
    }
    let original_hp_ratio = ctx.side_array(drawn_side)[drawn_idx].hp_ratio();

    let candidates: Vec<ActorRef> = ctx
        .side_array(drawn_side)
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated() && a.is_front_row() && a.skill_effects.misc.cover_rows_behind)
        .filter(|(_, a)| cover_condition_met(a.skill_effects.misc.cover_condition, original_hp_ratio))
        .map(|(i, a)| a.actor_ref(i))
        .collect();

    match weighted_pick(ctx, &candidates) {
        Some(cover_actor) => {
            let effect = Effect::new(EffectKind::Cover).target(cover_actor).extra(drawn.0 as i64);
            (cover_actor, Some(effect))
        }
        None => (drawn, None),
    }
}

fn cover_condition_met(condition: CoverCondition, original_target_hp_ratio: f64) -> bool {
    match condition {
        CoverCondition::None => true,
        CoverCondition::AllyHpBelow50 => original_target_hp_ratio <= 0.5,
    }
}

/// Lowest-HP-ratio living same-side actor, optionally restricted to at or
/// below half HP.
pub fn select_healing_target(ctx: &BattleContext, side: Side, require_half_hp: bool) -> Option<ActorRef> {
    ctx.side_array(side)
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated())
        .filter(|(_, a)| !require_half_hp || a.hp_ratio() <= 0.5)
        .min_by(|(_, a), (_, b)| a.hp_ratio().partial_cmp(&b.hp_ratio()).unwrap())
        .map(|(i, a)| a.actor_ref(i))
}

/// Uniform sample without replacement of up to `max_targets` living actors,
/// drawn from both sides when `allow_friendly_targets` is set or only the
/// opposing side otherwise.
pub fn select_status_targets(
    ctx: &mut BattleContext,
    actor_ref: ActorRef,
    allow_friendly_targets: bool,
    max_targets: usize,
) -> Vec<ActorRef> {
    let mut pool: Vec<ActorRef> = ctx
        .side_array(opposing(actor_ref.side()))
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated())
        .map(|(i, a)| a.actor_ref(i))
        .collect();
    if allow_friendly_targets {
        pool.extend(
            ctx.side_array(actor_ref.side())
                .iter()
                .enumerate()
                .filter(|(_, a)| !a.is_defeated())
                .map(|(i, a)| a.actor_ref(i)),
        );
    }
    pool.sort();
    pool.dedup();

    let mut chosen = Vec::new();
    while !pool.is_empty() && chosen.len() < max_targets {
        let idx = ctx.rng.int_in_range(0, pool.len() as i64 - 1) as usize;
        chosen.push(pool.remove(idx));
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn offensive_target_picks_living_opponent() {
        let mut fx = Fixture::duel();
        let attacker = fx.players[0].actor_ref(0);
        let mut ctx = fx.context();
        let target = select_offensive_target(&mut ctx, attacker).unwrap();
        assert_eq!(target.side(), Side::Enemy);
    }

    #[test]
    fn sacrifice_override_takes_priority() {
        let mut fx = Fixture::duel();
        fx.enemies.push(actor(Side::Enemy, 2, None, "slime2"));
        let attacker = fx.players[0].actor_ref(0);
        let mut ctx = fx.context();
        let forced = ctx.actor_ref_at(Side::Enemy, 1);
        ctx.sacrifice_targets.insert(Side::Enemy, forced);
        let target = select_offensive_target(&mut ctx, attacker).unwrap();
        assert_eq!(target, forced);
        assert!(ctx.sacrifice_targets.is_empty());
    }

    #[test]
    fn healing_target_is_lowest_ratio() {
        let mut fx = Fixture::duel();
        fx.players.push(actor(Side::Player, 2, Some(2), "cleric"));
        fx.players[1].current_hp = 10;
        let ctx = fx.context();
        let target = select_healing_target(&ctx, Side::Player, false).unwrap();
        assert_eq!(target, ActorRef::player(2));
    }
}
