use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use super::arena::{Arena, Node};
use super::config::CollectibleRule;
use crate::error::LedgerError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectibleKind {
    Cheap,
    Good,
    Extreme,
}

impl CollectibleKind {
    /// Spawn order used by the distribution phase.
    pub const ALL: [CollectibleKind; 3] = [
        CollectibleKind::Cheap,
        CollectibleKind::Good,
        CollectibleKind::Extreme,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CollectibleKind::Cheap => "cheap",
            CollectibleKind::Good => "good",
            CollectibleKind::Extreme => "extreme",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// A scoring item. `id` is unique for the whole game.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Collectible {
    pub id: u32,
    pub kind: CollectibleKind,
    pub points: i32,
    /// Turn in which the item is removed if still uncollected.
    pub expires_in_turn: Option<u32>,
}

impl Collectible {
    pub fn is_expired(&self, turn: u32) -> bool {
        self.expires_in_turn.is_some_and(|t| t <= turn)
    }
}

impl fmt::Display for Collectible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({} pts)", self.kind.name(), self.id, self.points)
    }
}

/// Two-way index between nodes and the collectibles sitting on them.
#[derive(Debug, Default)]
pub struct CollectibleLedger {
    by_id: BTreeMap<u32, (Collectible, Node)>,
    by_node: HashMap<Node, u32>,
    next_id: u32,
}

impl CollectibleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `c` on `node`. Overwriting an occupied node is refused.
    pub fn place(&mut self, c: Collectible, node: Node) -> Result<(), LedgerError> {
        if self.by_node.contains_key(&node) {
            return Err(LedgerError::Occupied { node });
        }
        if self.by_id.contains_key(&c.id) {
            return Err(LedgerError::AlreadyPlaced { id: c.id });
        }
        self.by_id.insert(c.id, (c, node));
        self.by_node.insert(node, c.id);
        self.next_id = self.next_id.max(c.id + 1);
        Ok(())
    }

    /// Take `c` off the board, returning the node it occupied.
    pub fn remove(&mut self, c: &Collectible) -> Result<Node, LedgerError> {
        let (_, node) = self
            .by_id
            .remove(&c.id)
            .ok_or(LedgerError::NotFound { id: c.id })?;
        self.by_node.remove(&node);
        Ok(node)
    }

    pub fn collectible_at(&self, node: Node) -> Option<Collectible> {
        let id = self.by_node.get(&node)?;
        self.by_id.get(id).map(|(c, _)| *c)
    }

    pub fn node_of(&self, c: &Collectible) -> Option<Node> {
        self.by_id.get(&c.id).map(|(_, n)| *n)
    }

    /// All collectibles with their nodes, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (Collectible, Node)> + '_ {
        self.by_id.values().copied()
    }

    /// Collectibles whose expiry turn is at or before `turn`, ordered by id.
    pub fn expired(&self, turn: u32) -> Vec<(Collectible, Node)> {
        self.iter().filter(|(c, _)| c.is_expired(turn)).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Spawn step of the distribution phase. For each kind in order, draw
    /// against its probability and, on success, place a new collectible on a
    /// uniformly chosen node that is open, empty and free of worms.
    pub fn distribute<R: Rng>(
        &mut self,
        arena: &Arena,
        rules: &BTreeMap<CollectibleKind, CollectibleRule>,
        occupied: &HashSet<Node>,
        turn: u32,
        rng: &mut R,
    ) -> Result<Vec<(Collectible, Node)>, LedgerError> {
        let mut added = Vec::new();

        for kind in CollectibleKind::ALL {
            let Some(rule) = rules.get(&kind) else {
                continue;
            };
            if rule.probability <= 0.0 || rng.gen::<f64>() >= rule.probability {
                continue;
            }
            let candidates: Vec<Node> = arena
                .open_nodes()
                .filter(|n| !occupied.contains(n) && !self.by_node.contains_key(n))
                .collect();
            let Some(&node) = candidates.choose(rng) else {
                tracing::debug!(kind = kind.name(), "No free node for collectible");
                continue;
            };
            let c = Collectible {
                id: self.next_id,
                kind,
                points: rule.points,
                // A window reaching past u32::MAX never closes.
                expires_in_turn: rule.expiration.and_then(|e| turn.checked_add(e)),
            };
            self.place(c, node)?;
            added.push((c, node));
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn item(id: u32) -> Collectible {
        Collectible {
            id,
            kind: CollectibleKind::Cheap,
            points: 1,
            expires_in_turn: None,
        }
    }

    #[test]
    fn test_place_and_lookup() {
        let mut ledger = CollectibleLedger::new();
        let n = Node::new(1, 1);
        ledger.place(item(0), n).unwrap();
        assert_eq!(ledger.collectible_at(n), Some(item(0)));
        assert_eq!(ledger.node_of(&item(0)), Some(n));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_place_occupied_node_is_refused() {
        let mut ledger = CollectibleLedger::new();
        let n = Node::new(1, 1);
        ledger.place(item(0), n).unwrap();
        assert_eq!(
            ledger.place(item(1), n),
            Err(LedgerError::Occupied { node: n })
        );
        // Same collectible on a second node is refused too.
        assert_eq!(
            ledger.place(item(0), Node::new(2, 2)),
            Err(LedgerError::AlreadyPlaced { id: 0 })
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_remove_clears_both_directions() {
        let mut ledger = CollectibleLedger::new();
        let n = Node::new(3, 1);
        ledger.place(item(7), n).unwrap();
        assert_eq!(ledger.remove(&item(7)), Ok(n));
        assert!(ledger.collectible_at(n).is_none());
        assert!(ledger.node_of(&item(7)).is_none());
        assert_eq!(
            ledger.remove(&item(7)),
            Err(LedgerError::NotFound { id: 7 })
        );
        // Node is free again.
        ledger.place(item(8), n).unwrap();
    }

    #[test]
    fn test_expired() {
        let mut ledger = CollectibleLedger::new();
        let mut a = item(0);
        a.expires_in_turn = Some(8);
        ledger.place(a, Node::new(1, 1)).unwrap();
        ledger.place(item(1), Node::new(2, 1)).unwrap();
        assert!(ledger.expired(7).is_empty());
        assert_eq!(ledger.expired(8), vec![(a, Node::new(1, 1))]);
        assert_eq!(ledger.expired(100).len(), 1); // item(1) never expires
    }

    #[test]
    fn test_distribute_respects_occupancy() {
        let arena = Arena::parse("#####\n#   #\n#####").unwrap();
        let mut rules = BTreeMap::new();
        rules.insert(
            CollectibleKind::Good,
            CollectibleRule {
                probability: 1.0,
                points: 5,
                expiration: Some(3),
            },
        );
        let occupied: HashSet<Node> = [Node::new(1, 1), Node::new(3, 1)].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(1);
        let mut ledger = CollectibleLedger::new();

        let added = ledger
            .distribute(&arena, &rules, &occupied, 5, &mut rng)
            .unwrap();
        assert_eq!(added.len(), 1);
        let (c, n) = added[0];
        assert_eq!(n, Node::new(2, 1));
        assert_eq!(c.kind, CollectibleKind::Good);
        assert_eq!(c.points, 5);
        assert_eq!(c.expires_in_turn, Some(8));

        // Board is full now; nothing more can spawn.
        let added = ledger
            .distribute(&arena, &rules, &occupied, 6, &mut rng)
            .unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn test_distribute_with_huge_expiration_never_expires() {
        use crate::engine::config::GameConfig;

        let config = GameConfig::parse(
            "collectible.probability.cheap=1\ncollectible.expiration.cheap=4294967295",
        )
        .unwrap();
        let arena = Arena::parse("#####\n#   #\n#####").unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut ledger = CollectibleLedger::new();

        let added = ledger
            .distribute(&arena, &config.collectibles, &HashSet::new(), 1, &mut rng)
            .unwrap();
        let cheap: Vec<_> = added
            .iter()
            .filter(|(c, _)| c.kind == CollectibleKind::Cheap)
            .collect();
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].0.expires_in_turn, None);
        assert!(ledger
            .expired(u32::MAX)
            .iter()
            .all(|(c, _)| c.kind != CollectibleKind::Cheap));
    }

    #[test]
    fn test_distribute_zero_probability() {
        let arena = Arena::parse("     ").unwrap();
        let rules: BTreeMap<_, _> = CollectibleKind::ALL
            .iter()
            .map(|k| {
                (
                    *k,
                    CollectibleRule {
                        probability: 0.0,
                        points: 1,
                        expiration: None,
                    },
                )
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(9);
        let mut ledger = CollectibleLedger::new();
        for turn in 0..50 {
            assert!(ledger
                .distribute(&arena, &rules, &HashSet::new(), turn, &mut rng)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_distribute_assigns_unique_ids() {
        let arena = Arena::parse("      \n      ").unwrap();
        let rules: BTreeMap<_, _> = CollectibleKind::ALL
            .iter()
            .map(|k| (*k, CollectibleRule { probability: 1.0, points: 1, expiration: None }))
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let mut ledger = CollectibleLedger::new();
        let added = ledger
            .distribute(&arena, &rules, &HashSet::new(), 0, &mut rng)
            .unwrap();
        let ids: HashSet<u32> = added.iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ledger.len(), 3);
    }
}
