//! The seven ordered end-of-turn operations.

use crate::context::BattleContext;
use crate::log::{ActorRef, Declaration, DeclarationKind, Effect, EffectKind, Side};
use crate::skill_effects::HpScale;
use crate::status::tick_all_statuses;
use crate::timed_buffs::tick_all_timed_buffs;

fn all_refs(ctx: &BattleContext, side: Side) -> Vec<ActorRef> {
    ctx.side_array(side).iter().enumerate().map(|(i, a)| a.actor_ref(i)).collect()
}

/// Step 1: each actor with `endOfTurnHealingPercent > 0` heals every
/// living same-side ally, one `healParty` entry per healer summing the
/// total restored.
fn party_heal(ctx: &mut BattleContext) {
    for side in [Side::Player, Side::Enemy] {
        for healer_ref in all_refs(ctx, side) {
            let percent = ctx
                .actor(healer_ref)
                .filter(|a| !a.is_defeated())
                .map(|a| a.skill_effects.misc.end_of_turn_healing_percent)
                .unwrap_or(0.0);
            if percent <= 0.0 {
                continue;
            }
            let mut total = 0i64;
            for ally_ref in all_refs(ctx, side) {
                let Some(ally) = ctx.actor_mut(ally_ref) else { continue };
                if ally.is_defeated() {
                    continue;
                }
                let amount = (percent * ally.snapshot.max_hp as f64 / 100.0).round().max(0.0) as i64;
                total += ally.heal(amount);
            }
            if total > 0 {
                ctx.append(
                    Some(healer_ref),
                    Declaration::new(DeclarationKind::Defend),
                    vec![Effect::new(EffectKind::HealParty).value(total as f64)],
                );
            }
        }
    }
}

/// Step 2: apply `endOfTurnSelfHPPercent` — positive heals, negative
/// damages.
fn self_heal_or_damage(ctx: &mut BattleContext) {
    for side in [Side::Player, Side::Enemy] {
        for actor_ref in all_refs(ctx, side) {
            let Some(actor) = ctx.actor_mut(actor_ref) else { continue };
            if actor.is_defeated() {
                continue;
            }
            let percent = actor.skill_effects.misc.end_of_turn_self_hp_percent;
            if percent == 0.0 {
                continue;
            }
            let amount = (percent.abs() * actor.snapshot.max_hp as f64 / 100.0).round().max(0.0) as i64;
            let (kind, moved) = if percent > 0.0 {
                (EffectKind::HealSelf, actor.heal(amount))
            } else {
                (EffectKind::DamageSelf, actor.damage(amount))
            };
            if moved > 0 {
                ctx.append(
                    Some(actor_ref),
                    Declaration::new(DeclarationKind::Defend),
                    vec![Effect::new(kind).target(actor_ref).value(moved as f64)],
                );
            }
        }
    }
}

/// Step 3: per-hit chance recoveries plus interval-based regen rules, both
/// read from `SpellEffects`.
fn spell_charge_recovery(ctx: &mut BattleContext) {
    for side in [Side::Player, Side::Enemy] {
        for actor_ref in all_refs(ctx, side) {
            let (recoveries, modifiers) = match ctx.actor(actor_ref) {
                Some(a) if !a.is_defeated() => (a.skill_effects.spell.charge_recoveries.clone(), a.skill_effects.spell.charge_modifiers.clone()),
                _ => continue,
            };

            for recovery in recoveries {
                if ctx.rng.percent_chance(recovery.base_chance_percent) {
                    let key = recovery.channel_or_spell.to_string();
                    if let Some(actor) = ctx.actor_mut(actor_ref) {
                        *actor.runtime.action_resources.entry(key).or_insert(0) += 1;
                    }
                    ctx.append(
                        Some(actor_ref),
                        Declaration::new(DeclarationKind::Defend),
                        vec![Effect::new(EffectKind::SpellChargeRecover).extra(recovery.channel_or_spell as i64)],
                    );
                }
            }

            for modifier in modifiers {
                let Some(regen) = modifier.regen else { continue };
                if regen.interval == 0 || ctx.turn % regen.interval != 0 {
                    continue;
                }
                let key = modifier.channel_or_spell.to_string();
                let Some(actor) = ctx.actor_mut(actor_ref) else { continue };
                let uses = actor.runtime.spell_charge_regen_usage.entry(modifier.channel_or_spell).or_insert(0);
                if *uses >= regen.max_triggers {
                    continue;
                }
                *uses += 1;
                let current = actor.runtime.action_resources.entry(key).or_insert(0);
                *current = (*current + regen.amount).min(regen.cap);
            }
        }
    }
}

/// Step 4: auto-resurrection from `resurrection.actives`, one roll per
/// entry per defeated actor per turn.
fn auto_resurrection(ctx: &mut BattleContext) {
    for side in [Side::Player, Side::Enemy] {
        for actor_ref in all_refs(ctx, side) {
            let actives = match ctx.actor(actor_ref) {
                Some(a) if a.is_defeated() => a.skill_effects.resurrection.actives.clone(),
                _ => continue,
            };
            for (entry_index, active) in actives.into_iter().enumerate() {
                let uses = ctx
                    .actor(actor_ref)
                    .map(|a| a.runtime.active_resurrection_uses.get(&entry_index).copied().unwrap_or(0))
                    .unwrap_or(0);
                if uses >= active.max_triggers {
                    continue;
                }
                if !ctx.rng.percent_chance(active.chance_percent) {
                    continue;
                }
                let Some(actor) = ctx.actor_mut(actor_ref) else { continue };
                let max_hp = actor.snapshot.max_hp;
                let restored = match active.hp_scale {
                    HpScale::Percent(p) => (p * max_hp as f64 / 100.0).round().max(1.0) as i64,
                    HpScale::MaxHp5Percent => (0.05 * max_hp as f64).round().max(1.0) as i64,
                };
                actor.current_hp = restored.min(max_hp);
                actor.runtime.status_effects.clear();
                *actor.runtime.active_resurrection_uses.entry(entry_index).or_insert(0) += 1;
                ctx.append(
                    Some(actor_ref),
                    Declaration::new(DeclarationKind::Defend),
                    vec![Effect::new(EffectKind::Resurrection).target(actor_ref).value(restored as f64)],
                );
                break;
            }
        }
    }
}

/// Step 5: every `necromancerInterval` turns, revive the first defeated
/// same-side ally (array order) to a small HP value.
fn necromancer_revival(ctx: &mut BattleContext) {
    for side in [Side::Player, Side::Enemy] {
        let casters: Vec<(ActorRef, u32)> = all_refs(ctx, side)
            .into_iter()
            .filter_map(|r| {
                ctx.actor(r)
                    .filter(|a| !a.is_defeated())
                    .and_then(|a| a.skill_effects.resurrection.necromancer_interval)
                    .map(|interval| (r, interval))
            })
            .collect();

        for (caster_ref, interval) in casters {
            if interval == 0 || ctx.turn % interval != 0 {
                continue;
            }
            let fallen = all_refs(ctx, side)
                .into_iter()
                .find(|r| ctx.actor(*r).map(|a| a.is_defeated()).unwrap_or(false));
            let Some(fallen_ref) = fallen else { continue };
            let Some(actor) = ctx.actor_mut(fallen_ref) else { continue };
            let restored = (0.05 * actor.snapshot.max_hp as f64).round().max(1.0) as i64;
            actor.current_hp = restored.min(actor.snapshot.max_hp);
            actor.runtime.status_effects.clear();
            ctx.append(
                Some(caster_ref),
                Declaration::new(DeclarationKind::Defend),
                vec![Effect::new(EffectKind::Necromancer).target(fallen_ref).value(restored as f64)],
            );
        }
    }
}

/// Step 7: clear guard state and attack-burst history.
fn guard_reset(ctx: &mut BattleContext) {
    for side in [Side::Player, Side::Enemy] {
        for actor_ref in all_refs(ctx, side) {
            let Some(actor) = ctx.actor_mut(actor_ref) else { continue };
            actor.runtime.guard_active = false;
            actor.runtime.guard_barrier_charges.clear();
            actor.runtime.attack_history.first_hit_done = false;
            actor.runtime.attack_history.consecutive_hits = 0;
        }
    }
}

/// Run the full end-of-turn sequence in its fixed order.
pub fn run_end_of_turn(ctx: &mut BattleContext) {
    party_heal(ctx);
    self_heal_or_damage(ctx);
    spell_charge_recovery(ctx);
    auto_resurrection(ctx);
    necromancer_revival(ctx);
    tick_all_statuses(ctx);
    tick_all_timed_buffs(ctx);
    guard_reset(ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn party_heal_restores_missing_hp() {
        let mut fx = Fixture::duel();
        fx.players[0].skill_effects.misc.end_of_turn_healing_percent = 10.0;
        fx.players[0].current_hp = 50;
        let mut ctx = fx.context();
        run_end_of_turn(&mut ctx);
        assert!(ctx.players[0].current_hp > 50);
    }

    #[test]
    fn guard_reset_clears_state() {
        let mut fx = Fixture::duel();
        fx.players[0].runtime.guard_active = true;
        fx.players[0].runtime.attack_history.consecutive_hits = 3;
        let mut ctx = fx.context();
        run_end_of_turn(&mut ctx);
        assert!(!ctx.players[0].runtime.guard_active);
        assert_eq!(ctx.players[0].runtime.attack_history.consecutive_hits, 0);
    }
}
