//! Trigger-based reactions, martial follow-ups, and rescue.

use crate::context::BattleContext;
use crate::damage::resolve_hit;
use crate::log::{ActorRef, Declaration, DeclarationKind, Effect, EffectKind, Side};
use crate::skill_effects::{ReactionDefinition, ReactionTargetMode, ReactionTrigger};
use tracing::debug;

/// Event fed into the dispatcher after an action or tick resolves.
#[derive(Debug, Clone, Copy)]
pub enum BattleEvent {
    Damaged {
        target: ActorRef,
        attacker: Option<ActorRef>,
        channel: crate::skill_effects::DamageChannel,
    },
    Evaded {
        target: ActorRef,
        attacker: Option<ActorRef>,
        channel: crate::skill_effects::DamageChannel,
    },
    Defeated {
        target: ActorRef,
        killer: Option<ActorRef>,
    },
    MagicAttackResolved {
        caster: ActorRef,
    },
    KilledEnemy {
        killer: ActorRef,
    },
}

/// Triggers that fire only on the actor the event happened to, as opposed
/// to every living same-side actor.
fn is_self_only(trigger: ReactionTrigger) -> bool {
    matches!(
        trigger,
        ReactionTrigger::SelfDamagedPhysical
            | ReactionTrigger::SelfDamagedMagical
            | ReactionTrigger::SelfEvadePhysical
            | ReactionTrigger::SelfKilledEnemy
    )
}

fn trigger_for(event: BattleEvent) -> Option<(ReactionTrigger, ActorRef)> {
    use crate::skill_effects::DamageChannel::*;
    match event {
        BattleEvent::Damaged { target, channel: Physical, .. } => Some((ReactionTrigger::SelfDamagedPhysical, target)),
        BattleEvent::Damaged { target, channel: Magical, .. } => Some((ReactionTrigger::SelfDamagedMagical, target)),
        BattleEvent::Damaged { .. } => None,
        BattleEvent::Evaded { target, channel: Physical, .. } => Some((ReactionTrigger::SelfEvadePhysical, target)),
        BattleEvent::Evaded { .. } => None,
        BattleEvent::Defeated { target, .. } => Some((ReactionTrigger::AllyDefeated, target)),
        BattleEvent::MagicAttackResolved { caster } => Some((ReactionTrigger::AllyMagicAttack, caster)),
        BattleEvent::KilledEnemy { killer } => Some((ReactionTrigger::SelfKilledEnemy, killer)),
    }
}

/// `allyDamagedPhysical` fires on every OTHER living same-side actor when
/// one of them takes physical damage; `selfDamagedPhysical` fires on the
/// actor who was hit. Both triggers key off the same event.
fn ally_damaged_trigger(event: BattleEvent) -> Option<ActorRef> {
    match event {
        BattleEvent::Damaged { target, channel: crate::skill_effects::DamageChannel::Physical, .. } => Some(target),
        _ => None,
    }
}

fn resolve_target(ctx: &BattleContext, mode: ReactionTargetMode, event: BattleEvent, reactor: ActorRef) -> Option<ActorRef> {
    let candidate = match (mode, event) {
        (ReactionTargetMode::Attacker, BattleEvent::Damaged { attacker, .. }) => attacker,
        (ReactionTargetMode::Attacker, BattleEvent::Evaded { attacker, .. }) => attacker,
        (ReactionTargetMode::Killer, BattleEvent::Defeated { killer, .. }) => killer,
        (ReactionTargetMode::RandomEnemy, _) => {
            let opposing = match reactor.side() {
                Side::Player => Side::Enemy,
                Side::Enemy => Side::Player,
            };
            return ctx
                .side_array(opposing)
                .iter()
                .enumerate()
                .find(|(_, a)| !a.is_defeated())
                .map(|(i, a)| a.actor_ref(i));
        }
        _ => None,
    }?;
    if ctx.actor(candidate).map(|a| a.is_defeated()).unwrap_or(true) {
        None
    } else {
        Some(candidate)
    }
}

/// Who a trigger applies to and within which same-side array it should be
/// evaluated: self-only triggers fire solely on the referenced actor;
/// everything else fires on every other living same-side actor.
fn reactors_for(ctx: &BattleContext, trigger: ReactionTrigger, reference: ActorRef) -> Vec<ActorRef> {
    if is_self_only(trigger) {
        return vec![reference];
    }
    ctx.side_array(reference.side())
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated())
        .map(|(i, a)| a.actor_ref(i))
        .filter(|r| *r != reference)
        .collect()
}

fn dispatch_one_trigger(ctx: &mut BattleContext, trigger: ReactionTrigger, reference: ActorRef, event: BattleEvent) {
    for reactor in reactors_for(ctx, trigger, reference) {
        let reactions: Vec<ReactionDefinition> = ctx
            .actor(reactor)
            .map(|a| {
                a.skill_effects
                    .combat
                    .reactions
                    .iter()
                    .copied()
                    .filter(|r| r.trigger == trigger)
                    .collect()
            })
            .unwrap_or_default();

        for reaction in reactions {
            if !ctx.rng.percent_chance(reaction.base_chance_percent) {
                continue;
            }
            let Some(target) = resolve_target(ctx, reaction.target_mode, event, reactor) else {
                continue;
            };
            fire_reaction(ctx, reactor, target, reaction);
        }
    }
}

/// Evaluate every reaction registered on every living actor against one
/// event, dispatching scaled counter-attacks while chain suppression is
/// held. Also handles rescue in the same pass for `AllyDefeated`.
pub fn dispatch_reactions(ctx: &mut BattleContext, event: BattleEvent) {
    if ctx.reaction_chain_active {
        return;
    }

    if let Some((trigger, reference)) = trigger_for(event) {
        dispatch_one_trigger(ctx, trigger, reference, event);
    }
    if let Some(reference) = ally_damaged_trigger(event) {
        dispatch_one_trigger(ctx, ReactionTrigger::AllyDamagedPhysical, reference, event);
    }

    if let BattleEvent::Defeated { target, .. } = event {
        attempt_rescue(ctx, target);
    }
}

fn fire_reaction(ctx: &mut BattleContext, reactor: ActorRef, target: ActorRef, reaction: ReactionDefinition) {
    debug!(?reactor, ?target, trigger = ?reaction.trigger, "reaction firing");
    let (attack_count, critical_chance_percent) = {
        let a = ctx.actor(reactor).expect("reactor must resolve");
        (a.snapshot.hit_count(), a.snapshot.critical_chance_percent)
    };
    let scaled_hits = ((attack_count as f64 * reaction.attack_count_multiplier).round() as i64).max(1) as u32;
    let scaled_critical = ((critical_chance_percent as f64 * reaction.critical_chance_percent_multiplier).floor() as i32).clamp(0, 100);

    ctx.reaction_chain_active = true;
    let mut effects = Vec::new();
    for hit_index in 1..=scaled_hits {
        let hit = crate::damage::roll_hit_chance(
            ctx,
            reactor,
            target,
            reaction.damage_type,
            reaction.accuracy_multiplier,
            hit_index,
        );
        if !hit {
            continue;
        }
        let saved_crit = ctx.actor(reactor).unwrap().snapshot.critical_chance_percent;
        if let Some(a) = ctx.actor_mut(reactor) {
            a.snapshot.critical_chance_percent = scaled_critical;
        }
        let mut result = resolve_hit(ctx, reactor, target, reaction.damage_type, hit_index, true, None);
        if let Some(a) = ctx.actor_mut(reactor) {
            a.snapshot.critical_chance_percent = saved_crit;
        }
        if let Some(defender) = ctx.actor_mut(target) {
            defender.damage(result.amount);
        }
        result.effect.kind = EffectKind::ReactionAttack;
        effects.push(result.effect);
    }
    ctx.reaction_chain_active = false;

    ctx.append(
        Some(reactor),
        Declaration::new(DeclarationKind::Defend),
        effects,
    );
}

/// After an `allyDefeated` trigger, any same-side actor with a satisfied
/// `RescueCapability` revives the fallen actor in addition to any reaction
/// that also fired.
fn attempt_rescue(ctx: &mut BattleContext, fallen: ActorRef) {
    let side = fallen.side();
    let rescuers: Vec<ActorRef> = ctx
        .side_array(side)
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_defeated() && !a.skill_effects.resurrection.rescue_capabilities.is_empty())
        .map(|(i, a)| a.actor_ref(i))
        .collect();

    for rescuer in rescuers {
        let capability = ctx
            .actor(rescuer)
            .and_then(|a| a.skill_effects.resurrection.rescue_capabilities.first().copied());
        let Some(capability) = capability else { continue };

        let level_met = ctx.actor(rescuer).map(|a| a.level >= capability.min_level).unwrap_or(false);
        let priest_magic_met = !capability.requires_priest_magic
            || ctx
                .actor(rescuer)
                .map(|a| a.runtime.action_resources.get("priestMagic").copied().unwrap_or(0) > 0)
                .unwrap_or(false);
        if !level_met || !priest_magic_met || !capability.guaranteed {
            continue;
        }

        let max_hp = ctx.actor(fallen).map(|a| a.snapshot.max_hp).unwrap_or(0);
        let restored = ((capability.revive_hp_percent * max_hp as f64 / 100.0).round() as i64).max(1);
        if let Some(target) = ctx.actor_mut(fallen) {
            target.current_hp = restored.min(target.snapshot.max_hp);
        }
        debug!(?rescuer, ?fallen, restored, "rescue triggered");

        ctx.append(
            Some(rescuer),
            Declaration::new(DeclarationKind::Defend),
            vec![Effect::new(EffectKind::Rescue).target(fallen).value(restored as f64)],
        );
        break;
    }
}

/// Martial follow-up: a bonus physical hit for `isMartialEligible`
/// attackers after a normal physical turn resolves. Shares the chain-
/// suppression flag with reactions so it never stacks or recurses.
pub fn maybe_martial_follow_up(ctx: &mut BattleContext, attacker: ActorRef, target: ActorRef) {
    if ctx.reaction_chain_active {
        return;
    }
    let eligible = ctx.actor(attacker).map(|a| a.snapshot.is_martial_eligible).unwrap_or(false);
    if !eligible || ctx.actor(target).map(|a| a.is_defeated()).unwrap_or(true) {
        return;
    }

    ctx.reaction_chain_active = true;
    let hit = crate::damage::roll_hit_chance(ctx, attacker, target, crate::skill_effects::DamageChannel::Physical, 1.0, 1);
    let mut effects = Vec::new();
    if hit {
        let result = resolve_hit(ctx, attacker, target, crate::skill_effects::DamageChannel::Physical, 1, true, None);
        if let Some(defender) = ctx.actor_mut(target) {
            defender.damage(result.amount);
        }
        effects.push(Effect::new(EffectKind::FollowUp).target(target).value(result.amount as f64));
    }
    ctx.reaction_chain_active = false;

    if !effects.is_empty() {
        ctx.append(Some(attacker), Declaration::new(DeclarationKind::Defend), effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill_effects::{DamageChannel, ReactionDefinition};
    use crate::test_support::*;

    #[test]
    fn chain_suppression_blocks_nested_dispatch() {
        let mut fx = Fixture::duel();
        let mut ctx = fx.context();
        ctx.reaction_chain_active = true;
        let target = ctx.players[0].actor_ref(0);
        dispatch_reactions(
            &mut ctx,
            BattleEvent::Damaged {
                target,
                attacker: None,
                channel: DamageChannel::Physical,
            },
        );
        assert!(ctx.log.entries.is_empty());
    }

    #[test]
    fn reaction_fires_on_matching_trigger() {
        let mut fx = Fixture::duel();
        let reactor_ref = fx.players[0].actor_ref(0);
        let attacker_ref = fx.enemies[0].actor_ref(0);
        fx.players[0].skill_effects.combat.reactions.push(ReactionDefinition {
            trigger: ReactionTrigger::SelfDamagedPhysical,
            target_mode: ReactionTargetMode::Attacker,
            base_chance_percent: 100,
            attack_count_multiplier: 1.0,
            critical_chance_percent_multiplier: 1.0,
            accuracy_multiplier: 1.0,
            damage_type: DamageChannel::Physical,
        });
        let mut ctx = fx.context();
        dispatch_reactions(
            &mut ctx,
            BattleEvent::Damaged {
                target: reactor_ref,
                attacker: Some(attacker_ref),
                channel: DamageChannel::Physical,
            },
        );
        assert!(!ctx.log.entries.is_empty());
    }
}
