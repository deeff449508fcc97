//! The structured, append-only battle log.

use serde::{Deserialize, Serialize};

pub const OUTCOME_VICTORY: i32 = 0;
pub const OUTCOME_DEFEAT: i32 = 1;
pub const OUTCOME_RETREAT: i32 = 2;

/// Which side of the battle an actor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Player,
    Enemy,
}

/// Stable integer id encoding side and slot: player refs are
/// `party_member_id` (1-origin); enemy refs are
/// `1000 * (array_index + 1) + enemy_master_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorRef(pub i32);

impl ActorRef {
    pub fn player(party_member_id: u8) -> Self {
        ActorRef(party_member_id as i32)
    }

    pub fn enemy(array_index: usize, enemy_master_index: u32) -> Self {
        ActorRef(1000 * (array_index as i32 + 1) + enemy_master_index as i32)
    }

    /// Enemy refs live at or above 1000 (and are always `>= 128`); player
    /// refs are small party-member ids. This range split is the documented
    /// convention for distinguishing sides from the ref alone.
    pub fn side(self) -> Side {
        if self.0 >= 128 {
            Side::Enemy
        } else {
            Side::Player
        }
    }

    pub fn is_player(self) -> bool {
        self.side() == Side::Player
    }

    pub fn is_enemy(self) -> bool {
        self.side() == Side::Enemy
    }
}

/// The channel or action family a turn's declaration belongs to, plus the
/// sentinel kinds used for battle-start/turn-start/outcome log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Attack,
    PriestMagic,
    MageMagic,
    Breath,
    Defend,
    EnemySpecialSkill,
    BattleStart,
    EnemyAppear,
    TurnStart,
    Victory,
    Defeat,
    Retreat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub extra: Option<i64>,
}

impl Declaration {
    pub fn new(kind: DeclarationKind) -> Self {
        Declaration { kind, extra: None }
    }

    pub fn with_extra(kind: DeclarationKind, extra: i64) -> Self {
        Declaration {
            kind,
            extra: Some(extra),
        }
    }
}

/// Every observable impact an action, reaction, or system tick can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    PhysicalDamage,
    MagicDamage,
    BreathDamage,
    MagicHeal,
    Resurrection,
    StatusInflict,
    StatusExpire,
    EnemySpecialDamage,
    EnemySpecialHeal,
    EnemySpecialBuff,
    ReactionAttack,
    FollowUp,
    Rescue,
    Necromancer,
    HealParty,
    HealSelf,
    DamageSelf,
    BuffExpire,
    SpellChargeRecover,
    Cover,
    EnemyAppear,
    Withdraw,
    LogOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Effect {
    pub kind: EffectKind,
    pub target: Option<ActorRef>,
    pub value: Option<f64>,
    pub status_id: Option<u8>,
    pub extra: Option<i64>,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Effect {
            kind,
            target: None,
            value: None,
            status_id: None,
            extra: None,
        }
    }

    pub fn target(mut self, target: ActorRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn status_id(mut self, status_id: u8) -> Self {
        self.status_id = Some(status_id);
        self
    }

    pub fn extra(mut self, extra: i64) -> Self {
        self.extra = Some(extra);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub turn: u32,
    pub actor: Option<ActorRef>,
    pub declaration: Declaration,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitialHp {
    pub player: Vec<i64>,
    pub enemy: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleLog {
    pub outcome: i32,
    pub turns: u32,
    pub initial_hp: InitialHp,
    pub entries: Vec<ActionEntry>,
}

impl BattleLog {
    pub fn new() -> Self {
        BattleLog {
            outcome: OUTCOME_RETREAT,
            turns: 0,
            initial_hp: InitialHp::default(),
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, turn: u32, actor: Option<ActorRef>, declaration: Declaration, effects: Vec<Effect>) {
        self.entries.push(ActionEntry {
            turn,
            actor,
            declaration,
            effects,
        });
    }

    pub fn sentinel(&mut self, turn: u32, kind: DeclarationKind) {
        self.append(turn, None, Declaration::new(kind), Vec::new());
    }
}

impl Default for BattleLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_side_ranges() {
        assert_eq!(ActorRef::player(3).side(), Side::Player);
        assert_eq!(ActorRef::enemy(0, 5).side(), Side::Enemy);
    }

    #[test]
    fn enemy_ref_distinguishes_master_index() {
        let a = ActorRef::enemy(2, 7);
        let b = ActorRef::enemy(2, 8);
        assert_ne!(a, b);
        assert_eq!(a.0, 1000 * 3 + 7);
    }
}
