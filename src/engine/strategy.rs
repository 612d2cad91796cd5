// Decision modules: the per-participant policies that turn observed events
// into moves, plus the strategies shipped with the game.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use super::arena::{Arena, Move, Node};
use super::event::TurnEvent;
use super::player::{Player, PlayerId};
use crate::error::SetupError;

/// Names accepted in the players configuration.
pub const STRATEGY_NAMES: [&str; 3] = ["idle", "random", "run-away"];

/// What a decision module knows about the game before turn 0.
#[derive(Clone, Debug)]
pub struct GameContext {
    pub player: PlayerId,
    pub players: Vec<Player>,
    pub arena: Arc<Arena>,
}

/// A module that failed to produce exactly one move.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("no move was chosen")]
    NoDecision,
    #[error("more than one move was chosen: {0:?}")]
    Ambiguous(Vec<Move>),
    #[error("{0}")]
    Failed(String),
}

/// Per-participant decision module. One instance lives for the whole game on
/// its own worker thread, so it may keep history across turns.
pub trait Strategy: Send + 'static {
    fn name(&self) -> &str;

    /// Called once before turn 0.
    fn start(&mut self, _ctx: &GameContext) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Every event batch is delivered here, even when the following decision
    /// will be discarded.
    fn notify(&mut self, _turn: u32, _events: &[TurnEvent]) {}

    /// Choose the move for the next turn.
    fn decide(&mut self, turn: u32) -> Result<Move, StrategyError>;

    /// Called exactly once at game end.
    fn shutdown(&mut self) {}
}

/// Build a shipped strategy by name. `seed` feeds randomized strategies.
pub fn create_strategy(name: &str, seed: u64) -> Result<Box<dyn Strategy>, SetupError> {
    match name {
        "idle" => Ok(Box::new(Idle)),
        "random" => Ok(Box::new(RandomSuicidal::new(seed))),
        "run-away" => Ok(Box::new(RunAway::default())),
        other => Err(SetupError::UnknownStrategy(other.to_string())),
    }
}

/// Never moves. Useful as a baseline and for tests.
#[derive(Debug, Default)]
pub struct Idle;

impl Strategy for Idle {
    fn name(&self) -> &str {
        "idle"
    }

    fn decide(&mut self, _turn: u32) -> Result<Move, StrategyError> {
        Ok(Move::Stay)
    }
}

/// Picks any move at random, walls included.
#[derive(Debug)]
pub struct RandomSuicidal {
    rng: StdRng,
}

impl RandomSuicidal {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Strategy for RandomSuicidal {
    fn name(&self) -> &str {
        "random"
    }

    fn decide(&mut self, _turn: u32) -> Result<Move, StrategyError> {
        Move::ALL
            .choose(&mut self.rng)
            .copied()
            .ok_or(StrategyError::NoDecision)
    }
}

/// Keeps as far away from the other heads as it safely can, breaking ties
/// toward the nearest collectible.
#[derive(Debug, Default)]
pub struct RunAway {
    me: Option<PlayerId>,
    arena: Option<Arc<Arena>>,
    bodies: HashMap<PlayerId, Vec<Node>>,
    gone: HashSet<PlayerId>,
    collectibles: HashMap<u32, Node>,
}

impl RunAway {
    fn track(&mut self, event: &TurnEvent) {
        match event {
            TurnEvent::PlayerMoved { player, body, .. } => {
                self.bodies.insert(*player, body.clone());
            }
            TurnEvent::PlayerCrashed { player, .. }
            | TurnEvent::PlayerDeactivated { player, .. } => {
                self.gone.insert(*player);
                self.bodies.remove(player);
            }
            TurnEvent::CollectibleAdded {
                collectible, node, ..
            } => {
                self.collectibles.insert(collectible.id, *node);
            }
            TurnEvent::CollectibleRemoved { collectible, .. }
            | TurnEvent::CollectibleCollected { collectible, .. } => {
                self.collectibles.remove(&collectible.id);
            }
            TurnEvent::SurvivalRewarded { .. } | TurnEvent::DecisionFailed { .. } => {}
        }
    }

    fn is_safe(&self, arena: &Arena, node: Node) -> bool {
        arena.contains(node) && !self.bodies.values().flatten().any(|n| *n == node)
    }
}

impl Strategy for RunAway {
    fn name(&self) -> &str {
        "run-away"
    }

    fn start(&mut self, ctx: &GameContext) -> Result<(), StrategyError> {
        self.me = Some(ctx.player);
        self.arena = Some(ctx.arena.clone());
        Ok(())
    }

    fn notify(&mut self, _turn: u32, events: &[TurnEvent]) {
        for event in events {
            self.track(event);
        }
    }

    fn decide(&mut self, _turn: u32) -> Result<Move, StrategyError> {
        let (Some(me), Some(arena)) = (self.me, self.arena.as_deref()) else {
            return Err(StrategyError::Failed("strategy was never started".into()));
        };
        let Some(head) = self.bodies.get(&me).and_then(|b| b.first()).copied() else {
            return Ok(Move::Stay);
        };

        let enemy_heads: Vec<Node> = self
            .bodies
            .iter()
            .filter(|(id, _)| **id != me && !self.gone.contains(id))
            .filter_map(|(_, body)| body.first().copied())
            .collect();

        let best = [Move::Up, Move::Down, Move::Left, Move::Right]
            .into_iter()
            .map(|m| (m, head.step(m)))
            .filter(|(_, target)| self.is_safe(arena, *target))
            .max_by_key(|(m, target)| {
                let escape = enemy_heads
                    .iter()
                    .map(|h| h.distance(*target))
                    .min()
                    .unwrap_or(u32::MAX);
                let food = self
                    .collectibles
                    .values()
                    .map(|c| c.distance(*target))
                    .min()
                    .unwrap_or(u32::MAX);
                // Earlier moves win remaining ties.
                (escape, std::cmp::Reverse(food), std::cmp::Reverse(*m))
            });

        Ok(best.map(|(m, _)| m).unwrap_or(Move::Stay))
    }
}
