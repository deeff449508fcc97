//! Mutable per-battle state shared by every component.

use std::collections::HashMap;

use crate::actor::Actor;
use crate::definitions::{EnemySkillDefinitions, SkillDefinitions, StatusDefinitions};
use crate::log::{ActorRef, BattleLog, Declaration, Effect, Side};
use crate::prng::{Prng, PrngPolicy};

pub const MAX_TURNS: u32 = 20;

#[derive(Debug, Clone, Copy)]
pub struct OrderInfo {
    pub speed: f64,
    pub tiebreaker: i64,
}

pub struct BattleContext<'a> {
    pub players: &'a mut Vec<Actor>,
    pub enemies: &'a mut Vec<Actor>,
    pub turn: u32,
    pub log: BattleLog,
    pub rng: &'a mut Prng,
    pub policy: PrngPolicy,

    pub status_definitions: &'a StatusDefinitions,
    pub skill_definitions: &'a SkillDefinitions,
    pub enemy_skill_definitions: &'a EnemySkillDefinitions,

    pub action_order_snapshot: HashMap<ActorRef, OrderInfo>,
    /// Forced offensive-target override keyed by the side being targeted;
    /// consumed (removed) the first time it is read.
    pub sacrifice_targets: HashMap<Side, ActorRef>,
    /// Set while a reaction/follow-up attack resolves damage, so that
    /// damage never recursively triggers another reaction.
    pub reaction_chain_active: bool,
}

impl<'a> BattleContext<'a> {
    pub fn new(
        players: &'a mut Vec<Actor>,
        enemies: &'a mut Vec<Actor>,
        status_definitions: &'a StatusDefinitions,
        skill_definitions: &'a SkillDefinitions,
        enemy_skill_definitions: &'a EnemySkillDefinitions,
        rng: &'a mut Prng,
        policy: PrngPolicy,
    ) -> Self {
        BattleContext {
            players,
            enemies,
            turn: 0,
            log: BattleLog::new(),
            rng,
            policy,
            status_definitions,
            skill_definitions,
            enemy_skill_definitions,
            action_order_snapshot: HashMap::new(),
            sacrifice_targets: HashMap::new(),
            reaction_chain_active: false,
        }
    }

    pub fn side_array(&self, side: Side) -> &Vec<Actor> {
        match side {
            Side::Player => self.players,
            Side::Enemy => self.enemies,
        }
    }

    pub fn side_array_mut(&mut self, side: Side) -> &mut Vec<Actor> {
        match side {
            Side::Player => self.players,
            Side::Enemy => self.enemies,
        }
    }

    pub fn actor_ref_at(&self, side: Side, index: usize) -> ActorRef {
        self.side_array(side)[index].actor_ref(index)
    }

    /// Resolve a stable `(side, index)` pair from an `ActorRef` by scanning
    /// the relevant array; refs are cheap, copyable descriptors that must
    /// survive array mutation.
    pub fn resolve(&self, r: ActorRef) -> Option<(Side, usize)> {
        let side = r.side();
        self.side_array(side)
            .iter()
            .enumerate()
            .find(|(i, a)| a.actor_ref(*i) == r)
            .map(|(i, _)| (side, i))
    }

    pub fn actor(&self, r: ActorRef) -> Option<&Actor> {
        let (side, idx) = self.resolve(r)?;
        self.side_array(side).get(idx)
    }

    pub fn actor_mut(&mut self, r: ActorRef) -> Option<&mut Actor> {
        let (side, idx) = self.resolve(r)?;
        Some(&mut self.side_array_mut(side)[idx])
    }

    pub fn living_indices(&self, side: Side) -> Vec<usize> {
        self.side_array(side)
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.is_defeated())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn all_defeated(&self, side: Side) -> bool {
        self.side_array(side).iter().all(|a| a.is_defeated())
    }

    pub fn append(&mut self, actor: Option<ActorRef>, declaration: Declaration, effects: Vec<Effect>) {
        let turn = self.turn;
        self.log.append(turn, actor, declaration, effects);
    }

    pub fn sentinel(&mut self, kind: crate::log::DeclarationKind) {
        let turn = self.turn;
        self.log.sentinel(turn, kind);
    }

    /// Take (and clear) the sacrifice override registered for `defender_side`,
    /// if any.
    pub fn take_sacrifice_target(&mut self, defender_side: Side) -> Option<ActorRef> {
        self.sacrifice_targets.remove(&defender_side)
    }
}
