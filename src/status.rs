//! Status-effect application, per-turn ticking, and expiry.

use crate::actor::StatusInstance;
use crate::context::BattleContext;
use crate::log::{ActorRef, Declaration, DeclarationKind, Effect, EffectKind};

/// Append or refresh a status on `target`. Duplicate ids refresh to
/// `max(existing, new)` duration unless the definition is stackable, in
/// which case a second independent instance is appended.
pub fn apply_status(ctx: &mut BattleContext, target: ActorRef, id: u8, source: Option<ActorRef>, stack_value: f64) {
    let duration = ctx
        .status_definitions
        .get(&id)
        .and_then(|d| d.duration_turns)
        .unwrap_or(0);
    let stackable = ctx.status_definitions.get(&id).map(|d| d.stackable).unwrap_or(false);

    let Some(actor) = ctx.actor_mut(target) else { return };
    if !stackable {
        if let Some(existing) = actor.runtime.status_effects.iter_mut().find(|s| s.id == id) {
            existing.remaining_turns = existing.remaining_turns.max(duration);
            existing.stack_value = stack_value;
            existing.source = source;
            return;
        }
    }
    actor.runtime.status_effects.push(StatusInstance {
        id,
        remaining_turns: duration,
        source,
        stack_value,
    });
}

pub fn is_action_locked(ctx: &BattleContext, actor_ref: ActorRef) -> bool {
    let Some(actor) = ctx.actor(actor_ref) else { return false };
    actor.runtime.status_effects.iter().any(|s| {
        ctx.status_definitions
            .get(&s.id)
            .map(|d| d.action_locked)
            .unwrap_or(false)
    })
}

/// Tick damage-over-time and decrement durations for one actor, emitting
/// `statusExpire` effects for anything that falls to zero turns.
fn tick_actor_statuses(ctx: &mut BattleContext, actor_ref: ActorRef) -> Vec<Effect> {
    let mut effects = Vec::new();
    let (tick_damages, expired_ids) = {
        let Some(actor) = ctx.actor(actor_ref) else {
            return effects;
        };
        let mut tick_damages = Vec::new();
        let mut expired_ids = Vec::new();
        for status in &actor.runtime.status_effects {
            if let Some(def) = ctx.status_definitions.get(&status.id) {
                if let Some(percent) = def.tick_damage_percent {
                    let amount = (percent * actor.snapshot.max_hp as f64 / 100.0).round().max(0.0) as i64;
                    if amount > 0 {
                        tick_damages.push((status.id, amount));
                    }
                }
            }
            if status.remaining_turns <= 1 {
                expired_ids.push(status.id);
            }
        }
        (tick_damages, expired_ids)
    };

    for (status_id, amount) in tick_damages {
        if let Some(actor) = ctx.actor_mut(actor_ref) {
            actor.damage(amount);
        }
        effects.push(Effect::new(EffectKind::DamageSelf).target(actor_ref).value(amount as f64).status_id(status_id));
    }

    if let Some(actor) = ctx.actor_mut(actor_ref) {
        for status in &mut actor.runtime.status_effects {
            status.remaining_turns = status.remaining_turns.saturating_sub(1);
        }
        actor.runtime.status_effects.retain(|s| s.remaining_turns > 0);
    }

    for status_id in expired_ids {
        effects.push(Effect::new(EffectKind::StatusExpire).target(actor_ref).status_id(status_id));
    }
    effects
}

/// Tick every living actor's statuses, one log entry per actor with at
/// least one effect.
pub fn tick_all_statuses(ctx: &mut BattleContext) {
    let refs: Vec<ActorRef> = ctx
        .players
        .iter()
        .enumerate()
        .map(|(i, a)| a.actor_ref(i))
        .chain(ctx.enemies.iter().enumerate().map(|(i, a)| a.actor_ref(i)))
        .filter(|r| ctx.actor(*r).map(|a| !a.is_defeated()).unwrap_or(false))
        .collect();

    for actor_ref in refs {
        let effects = tick_actor_statuses(ctx, actor_ref);
        if !effects.is_empty() {
            ctx.append(Some(actor_ref), Declaration::new(DeclarationKind::Defend), effects);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::StatusEffectDefinition;
    use crate::test_support::*;

    #[test]
    fn apply_then_refresh_takes_max_duration() {
        let mut fx = Fixture::duel();
        fx.status_definitions.insert(
            1,
            StatusEffectDefinition {
                id: 1,
                name: "poison".into(),
                duration_turns: Some(3),
                tick_damage_percent: Some(5.0),
                action_locked: false,
                stackable: false,
                tags: vec![],
            },
        );
        let target = fx.players[0].actor_ref(0);
        let mut ctx = fx.context();
        apply_status(&mut ctx, target, 1, None, 0.0);
        ctx.players[0].runtime.status_effects[0].remaining_turns = 1;
        apply_status(&mut ctx, target, 1, None, 0.0);
        assert_eq!(ctx.players[0].runtime.status_effects[0].remaining_turns, 3);
    }

    #[test]
    fn expiry_removes_status_and_emits_effect() {
        let mut fx = Fixture::duel();
        fx.status_definitions.insert(
            2,
            StatusEffectDefinition {
                id: 2,
                name: "blind".into(),
                duration_turns: Some(1),
                tick_damage_percent: None,
                action_locked: true,
                stackable: false,
                tags: vec![],
            },
        );
        let target = fx.players[0].actor_ref(0);
        let mut ctx = fx.context();
        apply_status(&mut ctx, target, 2, None, 0.0);
        assert!(is_action_locked(&ctx, target));
        tick_all_statuses(&mut ctx);
        assert!(ctx.players[0].runtime.status_effects.is_empty());
    }
}
