//! End-to-end battle scenarios covering the outcome and log-shape
//! invariants the engine must hold regardless of internal refactors.

use std::collections::HashMap;

use battle_engine::actor::{ActionRates, Actor, Attributes, CombatSnapshot, Resistances, RuntimeState};
use battle_engine::context::BattleContext;
use battle_engine::damage::compute_action_order;
use battle_engine::log::{DeclarationKind, EffectKind, OUTCOME_DEFEAT, OUTCOME_RETREAT, OUTCOME_VICTORY};
use battle_engine::skill_effects::{DamageChannel, SkillEffects, SpecialAttackDefinition};
use battle_engine::{run_battle, Prng, PrngPolicy, Side};

fn snapshot(max_hp: i64) -> CombatSnapshot {
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

fn mk_actor(side: Side, slot: u8, party_member_id: Option<u8>, name: &str) -> Actor {
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

#[test]
fn s1_strong_player_routs_weak_enemy_within_two_turns() {
    let mut player = mk_actor(Side::Player, 1, Some(1), "champion");
    player.snapshot.physical_attack_score = 5000.0;
    player.snapshot.max_hp = 50000;
    player.current_hp = 50000;
    player.snapshot.hit_score = 100.0;
    player.snapshot.attack_count = 1.0;
    player.attributes.luck = 35;

    let mut enemy = mk_actor(Side::Enemy, 1, None, "grunt");
    enemy.snapshot.max_hp = 1000;
    enemy.current_hp = 1000;
    enemy.snapshot.physical_defense_score = 100.0;
    enemy.snapshot.physical_attack_score = 100.0;
    enemy.attributes.luck = 1;

    let result = run_battle(
        vec![player],
        vec![enemy],
        &HashMap::new(),
        &HashMap::new(),
        &HashMap::new(),
        Prng::new(42),
        PrngPolicy { fixed_median: true },
    )
    .unwrap();

    assert_eq!(result.outcome, OUTCOME_VICTORY);
    assert!(result.turns <= 2, "expected a rout within 2 turns, got {}", result.turns);
    assert_eq!(result.entries.last().unwrap().declaration.kind, DeclarationKind::Victory);
}

#[test]
fn s2_weak_player_falls_to_strong_enemy() {
    let mut player = mk_actor(Side::Player, 1, Some(1), "rookie");
    player.snapshot.max_hp = 500;
    player.current_hp = 500;
    player.snapshot.physical_defense_score = 100.0;
    player.attributes.luck = 1;

    let mut enemy = mk_actor(Side::Enemy, 1, None, "brute");
    enemy.snapshot.physical_attack_score = 5000.0;
    enemy.snapshot.hit_score = 100.0;
    enemy.snapshot.max_hp = 50000;
    enemy.current_hp = 50000;

    let result = run_battle(
        vec![player],
        vec![enemy],
        &HashMap::new(),
        &HashMap::new(),
        &HashMap::new(),
        Prng::new(42),
        PrngPolicy { fixed_median: true },
    )
    .unwrap();

    assert_eq!(result.outcome, OUTCOME_DEFEAT);
    assert_eq!(result.entries.last().unwrap().declaration.kind, DeclarationKind::Defeat);
}

#[test]
fn s3_two_immortals_exhaust_the_turn_cap_into_retreat() {
    let mut player = mk_actor(Side::Player, 1, Some(1), "statue");
    player.snapshot.physical_attack_score = 0.0;
    player.snapshot.physical_defense_score = 99999.0;
    player.snapshot.max_hp = 999999;
    player.current_hp = 999999;
    player.runtime.action_rates = ActionRates::default();

    let mut enemy = mk_actor(Side::Enemy, 1, None, "golem");
    enemy.snapshot.physical_attack_score = 0.0;
    enemy.snapshot.physical_defense_score = 99999.0;
    enemy.snapshot.max_hp = 999999;
    enemy.current_hp = 999999;
    enemy.runtime.action_rates = ActionRates::default();

    let result = run_battle(
        vec![player],
        vec![enemy],
        &HashMap::new(),
        &HashMap::new(),
        &HashMap::new(),
        Prng::new(1),
        PrngPolicy::default(),
    )
    .unwrap();

    assert_eq!(result.outcome, OUTCOME_RETREAT);
    assert_eq!(result.turns, 20);
    let turn_starts: Vec<i64> = result
        .entries
        .iter()
        .filter(|e| e.declaration.kind == DeclarationKind::TurnStart)
        .map(|e| e.declaration.extra.unwrap())
        .collect();
    assert_eq!(turn_starts, (1..=20).collect::<Vec<i64>>());
}

#[test]
fn s4_guaranteed_enemy_retreat_ends_in_withdraw_then_sentinel() {
    let mut player = mk_actor(Side::Player, 1, Some(1), "outmatched");
    player.runtime.action_rates = ActionRates::default();

    let mut enemy = mk_actor(Side::Enemy, 1, None, "deserter");
    enemy.runtime.action_rates = ActionRates::default();
    enemy.skill_effects.misc.retreat_chance_percent = 100;

    let result = run_battle(
        vec![player],
        vec![enemy],
        &HashMap::new(),
        &HashMap::new(),
        &HashMap::new(),
        Prng::new(5),
        PrngPolicy::default(),
    )
    .unwrap();

    assert_eq!(result.outcome, OUTCOME_RETREAT);
    let last_two: Vec<_> = result.entries.iter().rev().take(2).collect();
    let withdraw_entry = last_two[1];
    let sentinel_entry = last_two[0];
    assert_eq!(sentinel_entry.declaration.kind, DeclarationKind::Retreat);
    assert!(sentinel_entry.effects.is_empty());
    assert_eq!(withdraw_entry.declaration.kind, DeclarationKind::Retreat);
    assert_eq!(withdraw_entry.effects.len(), 1);
    assert_eq!(withdraw_entry.effects[0].kind, EffectKind::Withdraw);
}

#[test]
fn s5_preemptive_wipe_logs_zero_turn_starts() {
    let mut player = mk_actor(Side::Player, 1, Some(1), "ambusher");
    player.snapshot.hit_score = 1000.0;
    player.snapshot.physical_attack_score = 1000.0;
    player.skill_effects.combat.special_attacks.push(SpecialAttackDefinition {
        preemptive: true,
        chance_percent: 100,
        damage_multiplier: 1.0,
        hit_count_override: Some(6),
        damage_type: DamageChannel::Physical,
    });

    let mut enemy = mk_actor(Side::Enemy, 1, None, "ambushed");
    enemy.snapshot.max_hp = 10;
    enemy.current_hp = 10;

    let result = run_battle(
        vec![player],
        vec![enemy],
        &HashMap::new(),
        &HashMap::new(),
        &HashMap::new(),
        Prng::new(13),
        PrngPolicy::default(),
    )
    .unwrap();

    assert_eq!(result.outcome, OUTCOME_VICTORY);
    assert!(!result.entries.iter().any(|e| e.declaration.kind == DeclarationKind::TurnStart));
}

#[test]
fn s6_first_strike_actor_leads_action_order_regardless_of_prng() {
    let mut first = mk_actor(Side::Player, 1, Some(1), "quickdraw");
    first.attributes.agility = 50;
    first.attributes.luck = 10;
    first.skill_effects.combat.first_strike = true;

    let mut second = mk_actor(Side::Player, 2, Some(2), "regular");
    second.attributes.agility = 50;
    second.attributes.luck = 10;

    let mut players = vec![first, second];
    let mut enemies: Vec<Actor> = Vec::new();
    let status_defs = HashMap::new();
    let skill_defs = HashMap::new();
    let enemy_skill_defs = HashMap::new();

    for seed in [1u64, 2, 3, 99, 1000] {
        let mut rng = Prng::new(seed);
        let mut ctx = BattleContext::new(
            &mut players,
            &mut enemies,
            &status_defs,
            &skill_defs,
            &enemy_skill_defs,
            &mut rng,
            PrngPolicy::default(),
        );
        let order = compute_action_order(&mut ctx);
        assert_eq!(order[0], ctx.players[0].actor_ref(0));
    }
}
