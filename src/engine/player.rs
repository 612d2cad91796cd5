use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::Serialize;

use super::arena::{Move, Node};

/// Participant identity. Ids are handed out in creation order, which is also
/// the priority order for every simultaneous tie-break.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayerId(pub usize);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a participant. Game state lives in [`Worm`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub strategy: String,
}

/// Mutable per-game state of one participant's worm.
#[derive(Clone, Debug)]
pub struct Worm {
    /// Head first.
    body: VecDeque<Node>,
    length: usize,
    score: i32,
    active: bool,
    /// Consecutive turns the head hasn't moved.
    inactive_turns: u32,
    decisions: BTreeMap<u32, Move>,
}

impl Worm {
    pub fn new(start: Node, length: usize) -> Self {
        Worm {
            body: VecDeque::from([start]),
            length: length.max(1),
            score: 0,
            active: true,
            inactive_turns: 0,
            decisions: BTreeMap::new(),
        }
    }

    pub fn head(&self) -> Node {
        // The body is never empty: it starts with one node and only the tail
        // beyond `length >= 1` is ever dropped.
        self.body[0]
    }

    pub fn body(&self) -> impl Iterator<Item = Node> + '_ {
        self.body.iter().copied()
    }

    pub fn body_vec(&self) -> Vec<Node> {
        self.body.iter().copied().collect()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn inactive_turns(&self) -> u32 {
        self.inactive_turns
    }

    pub fn decisions(&self) -> &BTreeMap<u32, Move> {
        &self.decisions
    }

    /// Apply a move: push the new head and trim the tail to the allowed
    /// length. STAY leaves the body untouched. Returns the new head, which
    /// may be a wall or outside the arena.
    pub fn advance(&mut self, turn: u32, m: Move) -> Node {
        self.decisions.insert(turn, m);
        if m == Move::Stay {
            self.inactive_turns += 1;
            return self.head();
        }
        self.inactive_turns = 0;
        let head = self.head().step(m);
        self.body.push_front(head);
        while self.body.len() > self.length {
            self.body.pop_back();
        }
        head
    }

    /// Does `node` hit this worm? The head itself is skipped when checking a
    /// worm against its own body.
    pub fn occupies(&self, node: Node, skip_head: bool) -> bool {
        let skip = usize::from(skip_head);
        self.body.iter().skip(skip).any(|n| *n == node)
    }

    pub fn grow(&mut self) {
        self.length += 1;
    }

    pub fn reward(&mut self, points: i32) {
        self.score += points;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worm() {
        let w = Worm::new(Node::new(2, 2), 3);
        assert_eq!(w.head(), Node::new(2, 2));
        assert_eq!(w.body_vec(), vec![Node::new(2, 2)]);
        assert_eq!(w.length(), 3);
        assert_eq!(w.score(), 0);
        assert!(w.is_active());
    }

    #[test]
    fn test_advance_grows_to_length_then_trims() {
        let mut w = Worm::new(Node::new(1, 1), 2);
        w.advance(0, Move::Right);
        assert_eq!(w.body_vec(), vec![Node::new(2, 1), Node::new(1, 1)]);
        w.advance(1, Move::Right);
        assert_eq!(w.body_vec(), vec![Node::new(3, 1), Node::new(2, 1)]);
        w.grow();
        w.advance(2, Move::Down);
        assert_eq!(
            w.body_vec(),
            vec![Node::new(3, 2), Node::new(3, 1), Node::new(2, 1)]
        );
    }

    #[test]
    fn test_stay_keeps_body_and_counts_inactivity() {
        let mut w = Worm::new(Node::new(1, 1), 2);
        w.advance(0, Move::Right);
        let before = w.body_vec();
        assert_eq!(w.advance(1, Move::Stay), Node::new(2, 1));
        assert_eq!(w.advance(2, Move::Stay), Node::new(2, 1));
        assert_eq!(w.body_vec(), before);
        assert_eq!(w.inactive_turns(), 2);
        w.advance(3, Move::Left);
        assert_eq!(w.inactive_turns(), 0);
        assert_eq!(w.decisions().len(), 4);
        assert_eq!(w.decisions()[&1], Move::Stay);
    }

    #[test]
    fn test_occupies() {
        let mut w = Worm::new(Node::new(1, 1), 3);
        w.advance(0, Move::Right);
        w.advance(1, Move::Right);
        assert!(w.occupies(Node::new(3, 1), false));
        assert!(!w.occupies(Node::new(3, 1), true));
        assert!(w.occupies(Node::new(1, 1), true));
        assert!(!w.occupies(Node::new(4, 1), false));
    }
}
