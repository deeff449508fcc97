//! Action order and the physical/magical/breath damage pipeline.

use crate::actor::Actor;
use crate::context::{BattleContext, OrderInfo};
use crate::log::{ActorRef, Effect, EffectKind, Side};
use crate::skill_effects::DamageChannel;
use tracing::trace;

const SHUFFLE_SPEED_SENTINEL: f64 = 5000.0;

/// Per-actor speed and tiebreaker used to sort the turn's action order.
fn compute_order_info(ctx: &mut BattleContext, actor_ref: ActorRef) -> OrderInfo {
    let (side, idx) = ctx.resolve(actor_ref).expect("actor_ref must resolve");
    let (shuffles_self, luck, agility, order_multiplier, speed_bonus_percent) = {
        let actor = &ctx.side_array(side)[idx];
        (
            actor.skill_effects.combat.action_order_shuffle,
            actor.attributes.luck,
            actor.attributes.agility,
            actor.skill_effects.combat.action_order_multiplier,
            actor.snapshot.speed_bonus_percent,
        )
    };
    let opposing_shuffles = match side {
        Side::Player => ctx.enemies.iter().any(|e| e.skill_effects.combat.action_order_shuffle_enemy),
        Side::Enemy => ctx.players.iter().any(|p| p.skill_effects.combat.action_order_shuffle_enemy),
    };

    let speed = if shuffles_self || opposing_shuffles {
        SHUFFLE_SPEED_SENTINEL
    } else {
        let mult = ctx.rng.speed_multiplier(luck, ctx.policy);
        (agility as f64 * 100.0 * mult * order_multiplier * (1.0 + speed_bonus_percent / 100.0)).round()
    };
    let tiebreaker = ctx.rng.int_in_range(0, i32::MAX as i64);
    OrderInfo { speed, tiebreaker }
}

/// Full turn action order: speed desc, tiebreaker desc, `firstStrike`
/// actors moved to the front preserving relative order.
pub fn compute_action_order(ctx: &mut BattleContext) -> Vec<ActorRef> {
    let refs: Vec<ActorRef> = ctx
        .players
        .iter()
        .enumerate()
        .map(|(i, a)| a.actor_ref(i))
        .chain(ctx.enemies.iter().enumerate().map(|(i, a)| a.actor_ref(i)))
        .collect();

    ctx.action_order_snapshot.clear();
    for r in &refs {
        let info = compute_order_info(ctx, *r);
        ctx.action_order_snapshot.insert(*r, info);
    }

    let mut ordered = refs;
    ordered.sort_by(|a, b| {
        let ia = ctx.action_order_snapshot[a];
        let ib = ctx.action_order_snapshot[b];
        ib.speed
            .partial_cmp(&ia.speed)
            .unwrap()
            .then(ib.tiebreaker.cmp(&ia.tiebreaker))
    });

    let (first_strike, rest): (Vec<_>, Vec<_>) = ordered.into_iter().partition(|r| {
        ctx.actor(*r)
            .map(|a| a.skill_effects.combat.first_strike)
            .unwrap_or(false)
    });
    let order: Vec<ActorRef> = first_strike.into_iter().chain(rest).collect();
    trace!(?order, "action order computed");
    order
}

fn hit_accuracy_modifier(hit_index: u32) -> f64 {
    match hit_index {
        1 | 2 => 1.0,
        3 => 0.6,
        n => 0.6 * 0.9f64.powi(n as i32 - 3),
    }
}

fn damage_modifier(hit_index: u32) -> f64 {
    if hit_index <= 2 {
        1.0
    } else {
        0.9f64.powi(hit_index as i32 - 2)
    }
}

fn scores(channel: DamageChannel, attacker: &Actor, defender: &Actor) -> (f64, f64, f64) {
    let (atk, atk_hit, def_hit) = match channel {
        DamageChannel::Physical => (
            attacker.snapshot.physical_attack_score,
            attacker.snapshot.hit_score,
            defender.snapshot.evasion_score,
        ),
        DamageChannel::Magical => (
            attacker.snapshot.magical_attack_score,
            attacker.snapshot.hit_score,
            defender.snapshot.evasion_score,
        ),
        DamageChannel::Breath => (
            attacker.snapshot.breath_damage_score,
            attacker.snapshot.hit_score,
            defender.snapshot.evasion_score,
        ),
    };
    (atk, atk_hit, def_hit)
}

fn defense_score(channel: DamageChannel, defender: &Actor) -> f64 {
    match channel {
        DamageChannel::Physical => defender.snapshot.physical_defense_score,
        DamageChannel::Magical => defender.snapshot.magical_defense_score,
        // No dedicated breath-defense stat; physical defense stands in.
        DamageChannel::Breath => defender.snapshot.physical_defense_score,
    }
}

/// Whether a single strike lands, combining the luck-scaled roll ratio
/// with an accuracy multiplier and per-hit falloff.
pub fn roll_hit_chance(
    ctx: &mut BattleContext,
    attacker: ActorRef,
    defender: ActorRef,
    channel: DamageChannel,
    accuracy_multiplier: f64,
    hit_index: u32,
) -> bool {
    let (attacker_luck, defender_luck, base_ratio);
    {
        let a = ctx.actor(attacker).expect("attacker must resolve");
        let d = ctx.actor(defender).expect("defender must resolve");
        let (atk_score, atk_hit, def_evasion) = scores(channel, a, d);
        attacker_luck = a.attributes.luck;
        defender_luck = d.attributes.luck;
        base_ratio = atk_hit / (atk_hit + def_evasion).max(1e-9);
        let _ = atk_score;
    }

    let attacker_roll = ctx.rng.stat_multiplier(attacker_luck, ctx.policy);
    let defender_roll = ctx.rng.stat_multiplier(defender_luck, ctx.policy);
    let random_factor = attacker_roll / defender_roll.max(1e-9);
    let luck_modifier = (attacker_luck - defender_luck) as f64 * 0.002;
    let raw_chance = (base_ratio * random_factor + luck_modifier)
        * accuracy_multiplier
        * hit_accuracy_modifier(hit_index);
    let final_chance = raw_chance.clamp(0.05, 0.95);
    ctx.rng.probability(final_chance)
}

/// Outcome of resolving a single hit of damage.
pub struct DamageResult {
    pub amount: i64,
    pub was_critical: bool,
    pub burst_stopped: bool,
    pub effect: Effect,
}

fn channel_effect_kind(channel: DamageChannel) -> EffectKind {
    match channel {
        DamageChannel::Physical => EffectKind::PhysicalDamage,
        DamageChannel::Magical => EffectKind::MagicDamage,
        DamageChannel::Breath => EffectKind::BreathDamage,
    }
}

/// Resolve one hit of the damage pipeline: base damage, crit, initial-strike
/// bonus, per-hit falloff, parry/shield-block, then barrier/guard mitigation.
/// `spell_id` selects a per-spell resistance multiplier for magical hits.
/// `extra_multiplier` scales the pre-mitigation damage, for preemptive and
/// enemy special attacks that carry their own flat multiplier.
#[allow(clippy::too_many_arguments)]
pub fn resolve_hit(
    ctx: &mut BattleContext,
    attacker: ActorRef,
    defender: ActorRef,
    channel: DamageChannel,
    hit_index: u32,
    suppress_parry_and_block: bool,
    spell_id: Option<u16>,
) -> DamageResult {
    resolve_hit_scaled(ctx, attacker, defender, channel, hit_index, suppress_parry_and_block, spell_id, 1.0)
}

/// See [`resolve_hit`]; also applies `extra_multiplier` to the base damage.
#[allow(clippy::too_many_arguments)]
pub fn resolve_hit_scaled(
    ctx: &mut BattleContext,
    attacker: ActorRef,
    defender: ActorRef,
    channel: DamageChannel,
    hit_index: u32,
    suppress_parry_and_block: bool,
    spell_id: Option<u16>,
    extra_multiplier: f64,
) -> DamageResult {
    let (attacker_luck, defender_luck, attack_score, defense_score_base, additional_damage, defender_additional_damage_score, resistance);
    {
        let a = ctx.actor(attacker).expect("attacker must resolve");
        let d = ctx.actor(defender).expect("defender must resolve");
        attacker_luck = a.attributes.luck;
        defender_luck = d.attributes.luck;
        let (score, _, _) = scores(channel, a, d);
        attack_score = score;
        defense_score_base = defense_score(channel, d);
        additional_damage = a.snapshot.additional_damage_score;
        defender_additional_damage_score = d.snapshot.additional_damage_score;
        resistance = match (channel, spell_id) {
            (DamageChannel::Magical, Some(id)) => d.resistances.per_spell.get(&id).copied().unwrap_or(1.0),
            _ => d.resistances.channel(channel),
        };
    }

    let attack_power = attack_score * ctx.rng.stat_multiplier(attacker_luck, ctx.policy);
    let mut defense_power = defense_score_base * ctx.rng.stat_multiplier(defender_luck, ctx.policy);
    let mut base_damage = (attack_power - defense_power).max(1.0);

    let crit_chance = ctx.actor(attacker).unwrap().snapshot.critical_chance_percent;
    let was_critical = ctx.rng.percent_chance(crit_chance);
    if was_critical {
        defense_power *= 0.5;
        base_damage = (attack_power - defense_power).max(1.0);
        let (crit_percent, crit_multiplier, crit_taken_multiplier) = {
            let a = ctx.actor(attacker).unwrap();
            let d = ctx.actor(defender).unwrap();
            (
                a.skill_effects.damage.critical_percent,
                a.skill_effects.damage.critical_multiplier,
                d.skill_effects.damage.critical_taken_multiplier,
            )
        };
        let crit_bonus = (1.0 + crit_percent / 100.0).max(0.0) * crit_multiplier.max(0.0);
        base_damage = base_damage * crit_bonus * crit_taken_multiplier;
    }

    let steps = ((attack_score - defense_score_base * 3.0) / 1000.0).floor();
    let initial_bonus = (1.0 + steps * 0.1).clamp(1.0, 3.4);

    let (dealt_mult, taken_mult) = {
        let a = ctx.actor(attacker).unwrap();
        let d = ctx.actor(defender).unwrap();
        (a.skill_effects.damage.dealt.get(channel), d.skill_effects.damage.taken.get(channel))
    };

    let mut damage = base_damage * initial_bonus * damage_modifier(hit_index) * dealt_mult * taken_mult * resistance * extra_multiplier;
    damage += additional_damage;
    let mut amount = damage.round().max(1.0) as i64;

    let mut burst_stopped = false;
    if !suppress_parry_and_block {
        let (defender_parry, parry_bonus, defender_block, block_bonus) = {
            let d = ctx.actor(defender).unwrap();
            (
                d.skill_effects.combat.parry_enabled,
                d.skill_effects.combat.parry_bonus_percent,
                d.skill_effects.combat.shield_block_enabled,
                d.skill_effects.combat.shield_block_bonus_percent,
            )
        };
        if defender_parry && hit_index > 1 {
            let chance = 10.0 + 0.25 * defender_additional_damage_score + parry_bonus;
            if ctx.rng.percent_chance(chance.round() as i32) {
                burst_stopped = true;
                amount = 0;
            }
        }
        if !burst_stopped && defender_block && hit_index == 1 {
            let chance = 30.0 - 0.5 * additional_damage + block_bonus;
            if ctx.rng.percent_chance(chance.round() as i32) {
                burst_stopped = true;
            }
        }
    }

    if amount > 0 {
        amount = apply_barrier_and_guard(ctx, defender, channel, amount);
    }

    trace!(?attacker, ?defender, ?channel, hit_index, amount, was_critical, burst_stopped, "hit resolved");

    let effect = Effect::new(channel_effect_kind(channel))
        .target(defender)
        .value(amount as f64);

    DamageResult {
        amount,
        was_critical,
        burst_stopped,
        effect,
    }
}

fn apply_barrier_and_guard(ctx: &mut BattleContext, defender: ActorRef, channel: DamageChannel, amount: i64) -> i64 {
    let defender_actor = ctx.actor_mut(defender).expect("defender must resolve");
    let guard_barrier = defender_actor.runtime.guard_barrier_charges.get(&channel).copied().unwrap_or(0);
    if guard_barrier > 0 && defender_actor.runtime.guard_active {
        defender_actor.runtime.guard_barrier_charges.insert(channel, guard_barrier - 1);
        return (amount / 3).max(1);
    }
    let barrier = defender_actor.runtime.barrier_charges.get(&channel).copied().unwrap_or(0);
    if barrier > 0 {
        defender_actor.runtime.barrier_charges.insert(channel, barrier - 1);
        return (amount / 3).max(1);
    }
    if defender_actor.runtime.guard_active {
        return (amount / 2).max(1);
    }
    amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn hit_chance_stays_within_clamp() {
        let mut fx = Fixture::duel();
        let attacker = fx.players[0].actor_ref(0);
        let defender = fx.enemies[0].actor_ref(0);
        let mut ctx = fx.context();
        for i in 1..10 {
            roll_hit_chance(&mut ctx, attacker, defender, DamageChannel::Physical, 1.0, i);
        }
    }

    #[test]
    fn damage_is_never_below_one() {
        let mut fx = Fixture::duel();
        fx.enemies[0].snapshot.physical_defense_score = 10_000.0;
        let attacker = fx.players[0].actor_ref(0);
        let defender = fx.enemies[0].actor_ref(0);
        let mut ctx = fx.context();
        let result = resolve_hit(&mut ctx, attacker, defender, DamageChannel::Physical, 1, true, None);
        assert!(result.amount >= 1);
    }

    #[test]
    fn guard_halves_damage_without_barrier() {
        let mut fx = Fixture::duel();
        fx.enemies[0].runtime.guard_active = true;
        let attacker = fx.players[0].actor_ref(0);
        let defender = fx.enemies[0].actor_ref(0);
        let mut ctx = fx.context();
        let with_guard = resolve_hit(&mut ctx, attacker, defender, DamageChannel::Physical, 1, true, None).amount;

        let mut fx2 = Fixture::duel();
        let mut ctx2 = fx2.context();
        let without_guard = resolve_hit(&mut ctx2, attacker, defender, DamageChannel::Physical, 1, true, None).amount;

        assert!(with_guard <= without_guard);
    }
}
