//! The full battle loop: `run_battle`, the engine's sole entry point.

use crate::action_selection::{select_action_candidates, ActionKind};
use crate::actor::{Actor, StatModifiers, TimedBuffInstance};
use crate::context::{BattleContext, MAX_TURNS};
use crate::damage::{compute_action_order, resolve_hit_scaled, roll_hit_chance};
use crate::definitions::{BuffType, EnemySkillDefinitions, EnemySkillKind, EnemyTargeting, SkillDefinitions, StatusDefinitions};
use crate::end_of_turn::run_end_of_turn;
use crate::error::BattleError;
use crate::log::{ActorRef, BattleLog, Declaration, DeclarationKind, Effect, EffectKind, Side, OUTCOME_DEFEAT, OUTCOME_RETREAT, OUTCOME_VICTORY};
use crate::prng::{Prng, PrngPolicy};
use crate::reactions::{dispatch_reactions, maybe_martial_follow_up, BattleEvent};
use crate::skill_effects::DamageChannel;
use crate::status::is_action_locked;
use crate::targeting::{select_healing_target, select_offensive_target_with_cover};
use crate::timed_buffs::{trigger_buffs, BuffTrigger};
use tracing::{debug, trace};

fn validate_all(players: &[Actor], enemies: &[Actor]) -> Result<(), BattleError> {
    if players.is_empty() {
        return Err(BattleError::EmptyPlayers);
    }
    if enemies.is_empty() {
        return Err(BattleError::EmptyEnemies);
    }
    for (i, actor) in players.iter().enumerate() {
        actor.validate(actor.actor_ref(i))?;
    }
    for (i, actor) in enemies.iter().enumerate() {
        actor.validate(actor.actor_ref(i))?;
    }
    Ok(())
}

fn opposing(side: Side) -> Side {
    match side {
        Side::Player => Side::Enemy,
        Side::Enemy => Side::Player,
    }
}

fn declaration_kind_for(kind: ActionKind) -> DeclarationKind {
    match kind {
        ActionKind::Attack => DeclarationKind::Attack,
        ActionKind::PriestMagic => DeclarationKind::PriestMagic,
        ActionKind::MageMagic => DeclarationKind::MageMagic,
        ActionKind::Breath => DeclarationKind::Breath,
        ActionKind::Defend => DeclarationKind::Defend,
        ActionKind::EnemySpecialSkill(_) => DeclarationKind::EnemySpecialSkill,
    }
}

fn channel_for(kind: ActionKind) -> DamageChannel {
    match kind {
        ActionKind::PriestMagic | ActionKind::MageMagic => DamageChannel::Magical,
        ActionKind::Breath => DamageChannel::Breath,
        _ => DamageChannel::Physical,
    }
}

fn charge_key_for(kind: ActionKind) -> Option<&'static str> {
    match kind {
        ActionKind::PriestMagic => Some("priestMagic"),
        ActionKind::MageMagic => Some("mageMagic"),
        _ => None,
    }
}

/// Execute one hit-burst offensive action (attack/priest/mage/breath) and
/// return whether it resolved against a real target.
fn resolve_offensive_action(ctx: &mut BattleContext, actor_ref: ActorRef, kind: ActionKind) -> bool {
    let channel = channel_for(kind);
    let charge_key = charge_key_for(kind);
    if let Some(key) = charge_key {
        let has_charge = ctx.actor(actor_ref).map(|a| a.runtime.action_resources.get(key).copied().unwrap_or(0) > 0).unwrap_or(false);
        if !has_charge {
            return false;
        }
    }

    let Some((target, cover_effect)) = select_offensive_target_with_cover(ctx, actor_ref) else {
        return false;
    };

    if let Some(key) = charge_key {
        if let Some(a) = ctx.actor_mut(actor_ref) {
            if let Some(charge) = a.runtime.action_resources.get_mut(key) {
                *charge = charge.saturating_sub(1);
            }
        }
    }

    let hits = ctx.actor(actor_ref).map(|a| a.snapshot.hit_count()).unwrap_or(1);
    let mut effects = Vec::new();
    if let Some(effect) = cover_effect {
        effects.push(effect);
    }

    let mut burst_stopped = false;
    for hit_index in 1..=hits {
        if burst_stopped {
            break;
        }
        let landed = roll_hit_chance(ctx, actor_ref, target, channel, 1.0, hit_index);
        if !landed {
            dispatch_reactions(ctx, BattleEvent::Evaded { target, attacker: Some(actor_ref), channel });
            continue;
        }

        let result = resolve_hit_scaled(ctx, actor_ref, target, channel, hit_index, false, None, 1.0);
        burst_stopped = result.burst_stopped;
        if result.amount > 0 {
            if let Some(defender) = ctx.actor_mut(target) {
                defender.damage(result.amount);
            }
            effects.push(result.effect);
            dispatch_reactions(ctx, BattleEvent::Damaged { target, attacker: Some(actor_ref), channel });

            let defeated = ctx.actor(target).map(|a| a.is_defeated()).unwrap_or(false);
            if defeated {
                effects.push(Effect::new(EffectKind::LogOnly).target(target));
                dispatch_reactions(ctx, BattleEvent::Defeated { target, killer: Some(actor_ref) });
                dispatch_reactions(ctx, BattleEvent::KilledEnemy { killer: actor_ref });
            }
        }
    }

    if channel == DamageChannel::Magical {
        dispatch_reactions(ctx, BattleEvent::MagicAttackResolved { caster: actor_ref });
    }
    if channel == DamageChannel::Physical {
        maybe_martial_follow_up(ctx, actor_ref, target);
    }

    ctx.append(Some(actor_ref), Declaration::new(declaration_kind_for(kind)), effects);
    true
}

fn resolve_defend(ctx: &mut BattleContext, actor_ref: ActorRef) -> bool {
    if let Some(actor) = ctx.actor_mut(actor_ref) {
        actor.runtime.guard_active = true;
    }
    ctx.append(Some(actor_ref), Declaration::new(DeclarationKind::Defend), Vec::new());
    true
}

fn resolve_enemy_special(ctx: &mut BattleContext, actor_ref: ActorRef, skill_id: u16) -> bool {
    let Some(def) = ctx.enemy_skill_definitions.get(&skill_id).cloned() else {
        return false;
    };
    if let Some(actor) = ctx.actor_mut(actor_ref) {
        *actor.runtime.enemy_skill_uses.entry(skill_id).or_insert(0) += 1;
    }

    let mut effects = Vec::new();
    match def.kind {
        EnemySkillKind::Physical | EnemySkillKind::Breath => {
            let channel = def.element.unwrap_or(match def.kind {
                EnemySkillKind::Breath => DamageChannel::Breath,
                _ => DamageChannel::Physical,
            });
            let targets = enemy_targets(ctx, actor_ref, def.targeting);
            let hits = def.hit_count.unwrap_or(1);
            let multiplier = def.damage_dealt_multiplier.unwrap_or(1.0);
            for target in targets {
                for hit_index in 1..=hits {
                    if !roll_hit_chance(ctx, actor_ref, target, channel, 1.0, hit_index) {
                        continue;
                    }
                    let result = resolve_hit_scaled(ctx, actor_ref, target, channel, hit_index, true, None, multiplier);
                    if let Some(defender) = ctx.actor_mut(target) {
                        defender.damage(result.amount);
                    }
                    effects.push(Effect::new(EffectKind::EnemySpecialDamage).target(target).value(result.amount as f64));
                    dispatch_reactions(ctx, BattleEvent::Damaged { target, attacker: Some(actor_ref), channel });
                    if ctx.actor(target).map(|a| a.is_defeated()).unwrap_or(false) {
                        dispatch_reactions(ctx, BattleEvent::Defeated { target, killer: Some(actor_ref) });
                    }
                }
            }
        }
        EnemySkillKind::Status => {
            let targets = enemy_targets(ctx, actor_ref, def.targeting);
            let Some(status_id) = def.status_id else { return false };
            let chance = def.status_chance.unwrap_or(100);
            for target in targets {
                if ctx.rng.percent_chance(chance) {
                    crate::status::apply_status(ctx, target, status_id, Some(actor_ref), 0.0);
                    effects.push(Effect::new(EffectKind::StatusInflict).target(target).status_id(status_id));
                }
            }
        }
        EnemySkillKind::Heal => {
            let percent = def.heal_percent.unwrap_or(0.0);
            let target = if def.heal_self_only {
                Some(actor_ref)
            } else {
                select_healing_target(ctx, actor_ref.side(), false)
            };
            if let Some(target) = target {
                let missing = ctx.actor(target).map(|a| a.snapshot.max_hp - a.current_hp).unwrap_or(0);
                let amount = (percent * missing as f64 / 100.0).round().max(0.0) as i64;
                if let Some(a) = ctx.actor_mut(target) {
                    let healed = a.heal(amount);
                    if healed > 0 {
                        effects.push(Effect::new(EffectKind::EnemySpecialHeal).target(target).value(healed as f64));
                    }
                }
            }
        }
        EnemySkillKind::Buff => {
            let Some(buff_type) = def.buff_type else { return false };
            let multiplier = def.buff_multiplier.unwrap_or(1.0);
            let stat_modifiers = match buff_type {
                BuffType::AttackUp => StatModifiers {
                    physical_attack_score: multiplier,
                    magical_attack_score: multiplier,
                    ..Default::default()
                },
                BuffType::DefenseUp => StatModifiers {
                    physical_defense_score: multiplier,
                    magical_defense_score: multiplier,
                    ..Default::default()
                },
                BuffType::SpeedUp => StatModifiers {
                    speed_bonus_percent: multiplier,
                    ..Default::default()
                },
            };
            if let Some(a) = ctx.actor_mut(actor_ref) {
                a.snapshot.physical_attack_score += stat_modifiers.physical_attack_score;
                a.snapshot.magical_attack_score += stat_modifiers.magical_attack_score;
                a.snapshot.physical_defense_score += stat_modifiers.physical_defense_score;
                a.snapshot.magical_defense_score += stat_modifiers.magical_defense_score;
                a.snapshot.speed_bonus_percent += stat_modifiers.speed_bonus_percent;
                a.runtime.timed_buffs.push(TimedBuffInstance {
                    id: skill_id as u32,
                    base_duration: 1,
                    remaining_turns: 1,
                    stat_modifiers,
                    source_skill_id: skill_id,
                });
            }
            effects.push(Effect::new(EffectKind::EnemySpecialBuff).target(actor_ref).extra(skill_id as i64));
        }
    }

    ctx.append(
        Some(actor_ref),
        Declaration::with_extra(DeclarationKind::EnemySpecialSkill, skill_id as i64),
        effects,
    );
    true
}

fn enemy_targets(ctx: &BattleContext, actor_ref: ActorRef, targeting: EnemyTargeting) -> Vec<ActorRef> {
    match targeting {
        EnemyTargeting::Self_ => vec![actor_ref],
        EnemyTargeting::SingleOpponent | EnemyTargeting::AllOpponents => {
            let side = opposing(actor_ref.side());
            let living: Vec<ActorRef> = ctx.side_array(side).iter().enumerate().filter(|(_, a)| !a.is_defeated()).map(|(i, a)| a.actor_ref(i)).collect();
            if matches!(targeting, EnemyTargeting::SingleOpponent) {
                living.into_iter().take(1).collect()
            } else {
                living
            }
        }
        EnemyTargeting::SingleAlly | EnemyTargeting::AllAllies => {
            let side = actor_ref.side();
            let living: Vec<ActorRef> = ctx.side_array(side).iter().enumerate().filter(|(_, a)| !a.is_defeated()).map(|(i, a)| a.actor_ref(i)).collect();
            if matches!(targeting, EnemyTargeting::SingleAlly) {
                living.into_iter().take(1).collect()
            } else {
                living
            }
        }
    }
}

/// Try each candidate in order; the first whose resolution is feasible
/// consumes the actor's turn.
fn resolve_first_feasible(ctx: &mut BattleContext, actor_ref: ActorRef, candidates: &[ActionKind]) {
    for kind in candidates {
        let resolved = match *kind {
            ActionKind::Attack | ActionKind::PriestMagic | ActionKind::MageMagic | ActionKind::Breath => {
                resolve_offensive_action(ctx, actor_ref, *kind)
            }
            ActionKind::Defend => resolve_defend(ctx, actor_ref),
            ActionKind::EnemySpecialSkill(id) => resolve_enemy_special(ctx, actor_ref, id),
        };
        if resolved {
            return;
        }
    }
}

fn side_wiped(ctx: &BattleContext, side: Side) -> bool {
    ctx.all_defeated(side)
}

fn check_enemy_retreat(ctx: &mut BattleContext) -> Option<ActorRef> {
    let enemy_refs: Vec<ActorRef> = ctx.enemies.iter().enumerate().filter(|(_, a)| !a.is_defeated()).map(|(i, a)| a.actor_ref(i)).collect();
    for enemy_ref in enemy_refs {
        let chance = ctx.actor(enemy_ref).map(|a| a.skill_effects.misc.retreat_chance_percent).unwrap_or(0);
        if chance > 0 && ctx.rng.percent_chance(chance) {
            return Some(enemy_ref);
        }
    }
    None
}

/// Run one full deterministic battle from start to a terminal outcome.
///
/// `run_battle` is the sole entry point: given actor arrays, read-only
/// master-data maps, and a seeded PRNG, it returns the append-only
/// structured log whose final entry is exactly one of victory/defeat/retreat.
pub fn run_battle(
    mut players: Vec<Actor>,
    mut enemies: Vec<Actor>,
    status_definitions: &StatusDefinitions,
    skill_definitions: &SkillDefinitions,
    enemy_skill_definitions: &EnemySkillDefinitions,
    mut rng: Prng,
    policy: PrngPolicy,
) -> Result<BattleLog, BattleError> {
    validate_all(&players, &enemies)?;
    debug!(players = players.len(), enemies = enemies.len(), "battle starting");

    let mut ctx = BattleContext::new(
        &mut players,
        &mut enemies,
        status_definitions,
        skill_definitions,
        enemy_skill_definitions,
        &mut rng,
        policy,
    );

    ctx.sentinel(DeclarationKind::BattleStart);
    let enemy_refs: Vec<ActorRef> = ctx.enemies.iter().enumerate().map(|(i, a)| a.actor_ref(i)).collect();
    for enemy_ref in enemy_refs {
        ctx.append(Some(enemy_ref), Declaration::new(DeclarationKind::EnemyAppear), vec![Effect::new(EffectKind::EnemyAppear)]);
    }
    ctx.log.initial_hp.player = ctx.players.iter().map(|a| a.current_hp).collect();
    ctx.log.initial_hp.enemy = ctx.enemies.iter().map(|a| a.current_hp).collect();

    trigger_buffs(&mut ctx, BuffTrigger::BattleStart);

    resolve_preemptive_attacks(&mut ctx);
    if side_wiped(&ctx, Side::Enemy) {
        debug!("enemies wiped by preemptive attacks, victory before turn 1");
        ctx.sentinel(DeclarationKind::Victory);
        ctx.log.outcome = OUTCOME_VICTORY;
        return Ok(finalize(ctx));
    }
    if side_wiped(&ctx, Side::Player) {
        debug!("players wiped by preemptive attacks, defeat before turn 1");
        ctx.sentinel(DeclarationKind::Defeat);
        ctx.log.outcome = OUTCOME_DEFEAT;
        return Ok(finalize(ctx));
    }

    for turn in 1..=MAX_TURNS {
        ctx.turn = turn;
        debug!(turn, "turn start");
        ctx.append(None, Declaration::with_extra(DeclarationKind::TurnStart, turn as i64), Vec::new());
        trigger_buffs(&mut ctx, BuffTrigger::EveryTurn);

        let order = compute_action_order(&mut ctx);
        for actor_ref in order {
            let alive = ctx.actor(actor_ref).map(|a| !a.is_defeated()).unwrap_or(false);
            if !alive || is_action_locked(&ctx, actor_ref) {
                continue;
            }
            let candidates = select_action_candidates(&mut ctx, actor_ref);
            trace!(?actor_ref, ?candidates, "action candidates selected");
            resolve_first_feasible(&mut ctx, actor_ref, &candidates);

            if side_wiped(&ctx, Side::Enemy) || side_wiped(&ctx, Side::Player) {
                break;
            }
        }

        if side_wiped(&ctx, Side::Enemy) {
            debug!(turn, "enemies wiped, victory");
            ctx.sentinel(DeclarationKind::Victory);
            ctx.log.outcome = OUTCOME_VICTORY;
            return Ok(finalize(ctx));
        }
        if side_wiped(&ctx, Side::Player) {
            debug!(turn, "players wiped, defeat");
            ctx.sentinel(DeclarationKind::Defeat);
            ctx.log.outcome = OUTCOME_DEFEAT;
            return Ok(finalize(ctx));
        }
        if let Some(withdrawing) = check_enemy_retreat(&mut ctx) {
            debug!(turn, ?withdrawing, "enemy retreats, battle ends");
            ctx.append(
                Some(withdrawing),
                Declaration::new(DeclarationKind::Retreat),
                vec![Effect::new(EffectKind::Withdraw).target(withdrawing)],
            );
            ctx.sentinel(DeclarationKind::Retreat);
            ctx.log.outcome = OUTCOME_RETREAT;
            return Ok(finalize(ctx));
        }

        run_end_of_turn(&mut ctx);
    }

    debug!(turns = MAX_TURNS, "turn cap reached, battle ends in retreat");
    ctx.sentinel(DeclarationKind::Retreat);
    ctx.log.outcome = OUTCOME_RETREAT;
    Ok(finalize(ctx))
}

/// Resolve every actor's preemptive `specialAttacks`, before turn 1.
fn resolve_preemptive_attacks(ctx: &mut BattleContext) {
    let refs: Vec<ActorRef> = ctx
        .players
        .iter()
        .enumerate()
        .map(|(i, a)| a.actor_ref(i))
        .chain(ctx.enemies.iter().enumerate().map(|(i, a)| a.actor_ref(i)))
        .collect();

    for actor_ref in refs {
        let attacks = ctx
            .actor(actor_ref)
            .map(|a| a.skill_effects.combat.special_attacks.iter().copied().filter(|s| s.preemptive).collect::<Vec<_>>())
            .unwrap_or_default();
        for attack in attacks {
            if !ctx.rng.percent_chance(attack.chance_percent) {
                continue;
            }
            let Some((target, _)) = select_offensive_target_with_cover(ctx, actor_ref) else {
                continue;
            };
            let hits = attack.hit_count_override.unwrap_or(1);
            let mut effects = Vec::new();
            for hit_index in 1..=hits {
                if !roll_hit_chance(ctx, actor_ref, target, attack.damage_type, 1.0, hit_index) {
                    continue;
                }
                let result = resolve_hit_scaled(ctx, actor_ref, target, attack.damage_type, hit_index, true, None, attack.damage_multiplier);
                if let Some(defender) = ctx.actor_mut(target) {
                    defender.damage(result.amount);
                }
                effects.push(result.effect);
            }
            if !effects.is_empty() {
                ctx.append(Some(actor_ref), Declaration::new(DeclarationKind::Attack), effects);
            }
        }
    }
}

fn finalize(ctx: BattleContext) -> BattleLog {
    let mut log = ctx.log;
    log.turns = ctx.turn;
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::actor;

    #[test]
    fn battle_with_already_defeated_enemies_ends_in_immediate_victory() {
        let mut enemy = actor(Side::Enemy, 1, None, "training dummy");
        enemy.current_hp = 0;
        let player = actor(Side::Player, 1, Some(1), "hero");

        let result = run_battle(
            vec![player],
            vec![enemy],
            &Default::default(),
            &Default::default(),
            &Default::default(),
            Prng::new(7),
            PrngPolicy::default(),
        )
        .unwrap();

        assert_eq!(result.outcome, OUTCOME_VICTORY);
        let last = result.entries.last().unwrap();
        assert_eq!(last.declaration.kind, DeclarationKind::Victory);
        assert_eq!(result.turns, 0);
    }

    #[test]
    fn one_shot_attacker_wins_within_turn_cap() {
        let enemy = actor(Side::Enemy, 1, None, "training dummy");
        let mut player = actor(Side::Player, 1, Some(1), "hero");
        player.snapshot.physical_attack_score = 500.0;

        let result = run_battle(
            vec![player],
            vec![enemy],
            &Default::default(),
            &Default::default(),
            &Default::default(),
            Prng::new(7),
            PrngPolicy { fixed_median: true },
        )
        .unwrap();

        assert_eq!(result.outcome, OUTCOME_VICTORY);
    }

    #[test]
    fn enemy_guaranteed_retreat_ends_battle_with_withdraw_then_sentinel() {
        let mut enemy = actor(Side::Enemy, 1, None, "coward");
        enemy.skill_effects.misc.retreat_chance_percent = 100;
        enemy.runtime.action_rates = crate::actor::ActionRates::default();
        let mut player = actor(Side::Player, 1, Some(1), "hero");
        player.runtime.action_rates = crate::actor::ActionRates::default();

        let result = run_battle(
            vec![player],
            vec![enemy],
            &Default::default(),
            &Default::default(),
            &Default::default(),
            Prng::new(3),
            PrngPolicy::default(),
        )
        .unwrap();

        assert_eq!(result.outcome, OUTCOME_RETREAT);
        let last_two: Vec<_> = result.entries.iter().rev().take(2).collect();
        assert_eq!(last_two[0].declaration.kind, DeclarationKind::Retreat);
        assert_eq!(last_two[1].declaration.kind, DeclarationKind::Retreat);
        assert_eq!(last_two[1].effects[0].kind, crate::log::EffectKind::Withdraw);
    }

    #[test]
    fn guaranteed_preemptive_attack_wipes_enemy_before_any_turn() {
        let mut enemy = actor(Side::Enemy, 1, None, "training dummy");
        enemy.current_hp = 10;
        enemy.snapshot.max_hp = 10;
        let mut player = actor(Side::Player, 1, Some(1), "hero");
        player.snapshot.hit_score = 1000.0;
        player.snapshot.physical_attack_score = 1000.0;
        player.skill_effects.combat.special_attacks.push(crate::skill_effects::SpecialAttackDefinition {
            preemptive: true,
            chance_percent: 100,
            damage_multiplier: 1.0,
            hit_count_override: Some(5),
            damage_type: DamageChannel::Physical,
        });

        let result = run_battle(
            vec![player],
            vec![enemy],
            &Default::default(),
            &Default::default(),
            &Default::default(),
            Prng::new(11),
            PrngPolicy::default(),
        )
        .unwrap();

        assert_eq!(result.outcome, OUTCOME_VICTORY);
        assert!(!result.entries.iter().any(|e| e.declaration.kind == DeclarationKind::TurnStart));
    }

    #[test]
    fn rejects_empty_player_roster() {
        let enemy = actor(Side::Enemy, 1, None, "slime");
        let err = run_battle(
            Vec::new(),
            vec![enemy],
            &Default::default(),
            &Default::default(),
            &Default::default(),
            Prng::new(1),
            PrngPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err, BattleError::EmptyPlayers);
    }

    #[test]
    fn enemy_speed_up_buff_raises_snapshot_speed_bonus() {
        let mut fx = crate::test_support::Fixture::duel();
        let enemy_ref = fx.enemies[0].actor_ref(0);
        fx.enemy_skill_definitions.insert(
            1,
            crate::definitions::EnemySkillDefinition {
                id: 1,
                name: "haste chant".to_string(),
                kind: EnemySkillKind::Buff,
                targeting: EnemyTargeting::Self_,
                chance_percent: 100,
                uses_per_battle: 1,
                damage_dealt_multiplier: None,
                hit_count: None,
                element: None,
                status_id: None,
                status_chance: None,
                heal_percent: None,
                heal_self_only: false,
                buff_type: Some(BuffType::SpeedUp),
                buff_multiplier: Some(50.0),
            },
        );
        let mut ctx = fx.context();
        let before = ctx.enemies[0].snapshot.speed_bonus_percent;
        assert!(resolve_enemy_special(&mut ctx, enemy_ref, 1));
        assert_eq!(ctx.enemies[0].snapshot.speed_bonus_percent, before + 50.0);
        assert_eq!(ctx.enemies[0].runtime.timed_buffs.len(), 1);
    }
}
