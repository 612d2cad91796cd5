use serde::Serialize;

use super::arena::{Move, Node};
use super::collectible::Collectible;
use super::player::PlayerId;

/// One state change of the simulation. Fed to the decision modules and to the
/// report, in the order the engine produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnEvent {
    PlayerMoved {
        turn: u32,
        player: PlayerId,
        direction: Move,
        /// Body after the move, head first.
        body: Vec<Node>,
    },
    PlayerDeactivated {
        turn: u32,
        player: PlayerId,
    },
    PlayerCrashed {
        turn: u32,
        player: PlayerId,
    },
    SurvivalRewarded {
        turn: u32,
        player: PlayerId,
        points: i32,
    },
    CollectibleAdded {
        turn: u32,
        collectible: Collectible,
        node: Node,
    },
    CollectibleRemoved {
        turn: u32,
        collectible: Collectible,
        node: Node,
    },
    CollectibleCollected {
        turn: u32,
        player: PlayerId,
        collectible: Collectible,
        node: Node,
    },
    /// A decision was replaced by STAY.
    DecisionFailed {
        turn: u32,
        player: PlayerId,
        reason: String,
    },
}

impl TurnEvent {
    pub fn turn(&self) -> u32 {
        match self {
            TurnEvent::PlayerMoved { turn, .. }
            | TurnEvent::PlayerDeactivated { turn, .. }
            | TurnEvent::PlayerCrashed { turn, .. }
            | TurnEvent::SurvivalRewarded { turn, .. }
            | TurnEvent::CollectibleAdded { turn, .. }
            | TurnEvent::CollectibleRemoved { turn, .. }
            | TurnEvent::CollectibleCollected { turn, .. }
            | TurnEvent::DecisionFailed { turn, .. } => *turn,
        }
    }

    /// The participant this event is about, if any.
    pub fn player(&self) -> Option<PlayerId> {
        match self {
            TurnEvent::PlayerMoved { player, .. }
            | TurnEvent::PlayerDeactivated { player, .. }
            | TurnEvent::PlayerCrashed { player, .. }
            | TurnEvent::SurvivalRewarded { player, .. }
            | TurnEvent::CollectibleCollected { player, .. }
            | TurnEvent::DecisionFailed { player, .. } => Some(*player),
            TurnEvent::CollectibleAdded { .. } | TurnEvent::CollectibleRemoved { .. } => None,
        }
    }

    /// The collectible this event is about, if any.
    pub fn collectible(&self) -> Option<&Collectible> {
        match self {
            TurnEvent::CollectibleAdded { collectible, .. }
            | TurnEvent::CollectibleRemoved { collectible, .. }
            | TurnEvent::CollectibleCollected { collectible, .. } => Some(collectible),
            _ => None,
        }
    }

    /// Label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TurnEvent::PlayerMoved { .. } => "player_moved",
            TurnEvent::PlayerDeactivated { .. } => "player_deactivated",
            TurnEvent::PlayerCrashed { .. } => "player_crashed",
            TurnEvent::SurvivalRewarded { .. } => "survival_rewarded",
            TurnEvent::CollectibleAdded { .. } => "collectible_added",
            TurnEvent::CollectibleRemoved { .. } => "collectible_removed",
            TurnEvent::CollectibleCollected { .. } => "collectible_collected",
            TurnEvent::DecisionFailed { .. } => "decision_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::collectible::CollectibleKind;

    #[test]
    fn test_serializes_with_kind_tag() {
        let e = TurnEvent::PlayerMoved {
            turn: 3,
            player: PlayerId(1),
            direction: Move::Left,
            body: vec![Node::new(1, 2)],
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "player_moved");
        assert_eq!(v["turn"], 3);
        assert_eq!(v["player"], 1);
        assert_eq!(v["direction"], "LEFT");
        assert_eq!(v["body"][0]["x"], 1);
    }

    #[test]
    fn test_accessors() {
        let c = Collectible {
            id: 4,
            kind: CollectibleKind::Extreme,
            points: 10,
            expires_in_turn: None,
        };
        let e = TurnEvent::CollectibleAdded {
            turn: 2,
            collectible: c,
            node: Node::new(0, 0),
        };
        assert_eq!(e.turn(), 2);
        assert_eq!(e.player(), None);
        assert_eq!(e.collectible(), Some(&c));
        assert_eq!(e.label(), "collectible_added");
    }
}
