use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use super::config::WALL_SIGN;
use crate::error::ArenaError;

/// A grid coordinate. Identity is the coordinate pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub x: i32,
    pub y: i32,
}

impl Node {
    pub const fn new(x: i32, y: i32) -> Self {
        Node { x, y }
    }

    /// The coordinate reached by applying `m`. Not validated against any arena.
    pub fn step(self, m: Move) -> Node {
        let (dx, dy) = m.delta();
        Node::new(self.x + dx, self.y + dy)
    }

    /// Manhattan distance between two coordinates.
    pub fn distance(self, other: Node) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// A requested direction of travel. `y` grows downwards, like the layout text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
    Stay,
}

impl Move {
    pub const ALL: [Move; 5] = [Move::Up, Move::Down, Move::Left, Move::Right, Move::Stay];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Move::Up => (0, -1),
            Move::Down => (0, 1),
            Move::Left => (-1, 0),
            Move::Right => (1, 0),
            Move::Stay => (0, 0),
        }
    }
}

/// Undirected link between two grid-adjacent open nodes. Stored with `a < b`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    a: Node,
    b: Node,
}

impl Edge {
    pub fn new(first: Node, second: Node) -> Self {
        if first <= second {
            Edge { a: first, b: second }
        } else {
            Edge { a: second, b: first }
        }
    }

    pub fn nodes(&self) -> (Node, Node) {
        (self.a, self.b)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Tile {
    Wall,
    Open,
}

/// The static arena: open nodes, their 4-neighbour adjacency and the labelled
/// starting positions. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct Arena {
    rows: Vec<Vec<Tile>>,
    width: usize,
    adjacency: HashMap<Node, Vec<Node>>,
    edges: BTreeSet<Edge>,
    starting: BTreeMap<char, Node>,
}

impl Arena {
    /// Parse the textual layout (`#` wall, space open, anything else a
    /// labelled starting cell).
    pub fn parse(text: &str) -> Result<Self, ArenaError> {
        Self::from_lines(text.lines())
    }

    /// Build the arena from an ordered sequence of layout lines.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, ArenaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rows = Vec::new();
        let mut starting = BTreeMap::new();
        let mut width = 0;

        for (y, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let mut row = Vec::with_capacity(line.len());
            for (x, label) in line.chars().enumerate() {
                let tile = match label {
                    WALL_SIGN => Tile::Wall,
                    ' ' => Tile::Open,
                    c if c.is_control() => {
                        return Err(ArenaError::Malformed(format!(
                            "control character {:?} at [{x}, {y}]",
                            c
                        )));
                    }
                    c => {
                        // Later labels win over earlier ones.
                        starting.insert(c, Node::new(x as i32, y as i32));
                        Tile::Open
                    }
                };
                row.push(tile);
            }
            width = width.max(row.len());
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(ArenaError::Malformed("layout has no lines".into()));
        }
        if !rows.iter().flatten().any(|t| *t == Tile::Open) {
            return Err(ArenaError::Malformed("layout has no open cell".into()));
        }

        let mut arena = Arena {
            rows,
            width,
            adjacency: HashMap::new(),
            edges: BTreeSet::new(),
            starting,
        };
        arena.link_all();
        Ok(arena)
    }

    fn link_all(&mut self) {
        let open: Vec<Node> = self.open_nodes().collect();
        for node in open {
            for m in [Move::Up, Move::Down, Move::Left, Move::Right] {
                let other = node.step(m);
                if self.is_available(other.x, other.y) {
                    self.link(node, other);
                }
            }
        }
    }

    fn link(&mut self, a: Node, b: Node) {
        if self.edges.insert(Edge::new(a, b)) {
            self.adjacency.entry(a).or_default().push(b);
            self.adjacency.entry(b).or_default().push(a);
        }
    }

    // --- Tile queries ---

    fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        if x < 0 || y < 0 {
            return None;
        }
        self.rows.get(y as usize)?.get(x as usize).copied()
    }

    /// Returns the open node at (x, y); walls and out-of-range coordinates fail.
    pub fn node_at(&self, x: i32, y: i32) -> Result<Node, ArenaError> {
        match self.tile(x, y) {
            Some(Tile::Open) => Ok(Node::new(x, y)),
            _ => Err(ArenaError::OutOfBounds { x, y }),
        }
    }

    /// True only for an in-range, non-wall coordinate.
    pub fn is_available(&self, x: i32, y: i32) -> bool {
        matches!(self.tile(x, y), Some(Tile::Open))
    }

    pub fn contains(&self, node: Node) -> bool {
        self.is_available(node.x, node.y)
    }

    /// Starting nodes in label order.
    pub fn starting_positions(&self) -> Vec<Node> {
        self.starting.values().copied().collect()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// All open nodes in row-major order.
    pub fn open_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.rows.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, t)| **t == Tile::Open)
                .map(move |(x, _)| Node::new(x as i32, y as i32))
        })
    }

    /// Neighbours of an open node. Empty for walls and unknown coordinates.
    pub fn neighbours(&self, node: Node) -> &[Node] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // --- Serialization ---

    /// Render the layout back to text lines.
    pub fn to_lines(&self) -> Vec<String> {
        let labels: HashMap<Node, char> = self.starting.iter().map(|(c, n)| (*n, *c)).collect();
        self.rows
            .iter()
            .enumerate()
            .map(|(y, row)| {
                row.iter()
                    .enumerate()
                    .map(|(x, tile)| match tile {
                        Tile::Wall => WALL_SIGN,
                        Tile::Open => labels
                            .get(&Node::new(x as i32, y as i32))
                            .copied()
                            .unwrap_or(' '),
                    })
                    .collect()
            })
            .collect()
    }

    /// Write the layout, one line per row.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        for line in self.to_lines() {
            writeln!(w, "{line}")?;
        }
        w.flush()
    }
}

impl fmt::Display for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.to_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "#####\n#A B#\n#####";

    #[test]
    fn test_round_trip() {
        let layouts = [
            SMALL,
            "#######\n#1    #\n# ### #\n#    2#\n#######",
            "  x\n# #\n#",
        ];
        for layout in layouts {
            let arena = Arena::parse(layout).unwrap();
            let expected: Vec<&str> = layout.lines().collect();
            assert_eq!(arena.to_lines(), expected);
        }
    }

    #[test]
    fn test_write_matches_layout() {
        let arena = Arena::parse(SMALL).unwrap();
        let mut out = Vec::new();
        arena.write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{SMALL}\n"));
        assert_eq!(arena.to_string(), format!("{SMALL}\n"));
    }

    #[test]
    fn test_dimensions() {
        let arena = Arena::parse("#####\n# #\n####").unwrap();
        assert_eq!(arena.width(), 5);
        assert_eq!(arena.height(), 3);
    }

    #[test]
    fn test_is_available() {
        let arena = Arena::parse(SMALL).unwrap();
        assert!(arena.is_available(1, 1));
        assert!(arena.is_available(2, 1));
        assert!(!arena.is_available(0, 0)); // wall
        assert!(!arena.is_available(4, 1)); // wall
        assert!(!arena.is_available(-1, 1));
        assert!(!arena.is_available(5, 1));
        assert!(!arena.is_available(1, 3));
        assert!(!arena.is_available(i32::MIN, i32::MAX));
    }

    #[test]
    fn test_short_row_has_no_nodes_beyond_length() {
        let arena = Arena::parse("#####\n# \n#####").unwrap();
        assert!(arena.is_available(1, 1));
        assert!(!arena.is_available(2, 1));
        assert!(!arena.is_available(3, 1));
    }

    #[test]
    fn test_node_at() {
        let arena = Arena::parse(SMALL).unwrap();
        assert_eq!(arena.node_at(3, 1).unwrap(), Node::new(3, 1));
        assert_eq!(
            arena.node_at(0, 0),
            Err(ArenaError::OutOfBounds { x: 0, y: 0 })
        );
        assert!(arena.node_at(7, 7).is_err());
    }

    #[test]
    fn test_starting_positions_in_label_order() {
        let arena = Arena::parse("#####\n#B A#\n#####").unwrap();
        assert_eq!(
            arena.starting_positions(),
            vec![Node::new(3, 1), Node::new(1, 1)]
        );
    }

    #[test]
    fn test_label_collision_last_wins() {
        let arena = Arena::parse("#####\n#A A#\n#####").unwrap();
        assert_eq!(arena.starting_positions(), vec![Node::new(3, 1)]);
        // The overwritten label is no longer a starting node.
        assert_eq!(arena.to_lines()[1], "#  A#");
    }

    #[test]
    fn test_edges_only_between_open_neighbours() {
        let arena = Arena::parse("#####\n#   #\n# # #\n#####").unwrap();
        for edge in arena.edges() {
            let (a, b) = edge.nodes();
            assert!(arena.contains(a));
            assert!(arena.contains(b));
            assert_eq!(a.distance(b), 1);
        }
        // Row 1: 2 horizontal edges, plus (1,1)-(1,2) and (3,1)-(3,2).
        assert_eq!(arena.edge_count(), 4);
        assert_eq!(arena.neighbours(Node::new(2, 1)).len(), 2);
        assert!(arena.neighbours(Node::new(2, 2)).is_empty()); // wall
    }

    #[test]
    fn test_no_duplicate_edges() {
        let arena = Arena::parse("   \n   ").unwrap();
        // 3x2 open grid: 2*2 horizontal + 3 vertical.
        assert_eq!(arena.edge_count(), 7);
        let mut seen = std::collections::HashSet::new();
        for e in arena.edges() {
            assert!(seen.insert(*e));
            let (a, b) = e.nodes();
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(Arena::parse(""), Err(ArenaError::Malformed(_))));
        assert!(matches!(
            Arena::parse("###\n###"),
            Err(ArenaError::Malformed(_))
        ));
        assert!(matches!(
            Arena::parse("# \t #"),
            Err(ArenaError::Malformed(_))
        ));
    }

    #[test]
    fn test_node_step() {
        let n = Node::new(2, 2);
        assert_eq!(n.step(Move::Up), Node::new(2, 1));
        assert_eq!(n.step(Move::Down), Node::new(2, 3));
        assert_eq!(n.step(Move::Left), Node::new(1, 2));
        assert_eq!(n.step(Move::Right), Node::new(3, 2));
        assert_eq!(n.step(Move::Stay), n);
    }
}
