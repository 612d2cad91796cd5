use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use serde::Serialize;

use super::arena::{Arena, Move, Node};
use super::collectible::{Collectible, CollectibleLedger};
use super::config::GameConfig;
use super::coordinator::DecisionCoordinator;
use super::event::TurnEvent;
use super::player::{Player, PlayerId, Worm};
use super::strategy::Strategy;
use crate::error::{GameError, SetupError};
use crate::metrics;
use crate::report::ReportSink;

/// Why the turn loop stopped. Both are normal endings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    TurnLimit,
    TooFewPlayers,
}

impl EndReason {
    pub fn label(self) -> &'static str {
        match self {
            EndReason::TurnLimit => "turn_limit",
            EndReason::TooFewPlayers => "too_few_players",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Init,
    /// Turns are being played; holds the next turn number.
    Running(u32),
    Terminated(EndReason),
    Reported,
}

/// Timing data from the last turn.
#[derive(Clone, Debug, Default)]
pub struct TurnTimings {
    pub total_ms: f64,
    /// Time spent waiting for decisions.
    pub solicit_ms: f64,
}

/// Turn engine: owns every worm, the collectible ledger and the decision
/// coordinator, and runs the seven-phase pipeline once per turn.
pub struct Game {
    arena: Arc<Arena>,
    config: GameConfig,
    players: Vec<Player>,
    worms: BTreeMap<PlayerId, Worm>,
    ledger: CollectibleLedger,
    coordinator: DecisionCoordinator,
    rng: StdRng,
    turn: u32,
    /// Moves collected at the end of the previous turn.
    pending: BTreeMap<PlayerId, Move>,
    phase: GamePhase,
    pub last_turn_timings: TurnTimings,
}

impl Game {
    /// Seat one participant per entry on the starting positions, in label
    /// order, and start their decision modules.
    pub fn new(
        arena: Arc<Arena>,
        config: GameConfig,
        entries: Vec<(String, Box<dyn Strategy>)>,
        rng: StdRng,
    ) -> Result<Self, SetupError> {
        if entries.is_empty() {
            return Err(SetupError::NotEnoughPlayers);
        }
        let starts = arena.starting_positions();
        if entries.len() > starts.len() {
            return Err(SetupError::TooManyPlayers {
                requested: entries.len(),
                supported: starts.len(),
            });
        }

        let mut players = Vec::with_capacity(entries.len());
        let mut worms = BTreeMap::new();
        let mut modules = Vec::with_capacity(entries.len());
        for (index, ((name, strategy), start)) in entries.into_iter().zip(starts).enumerate() {
            let player = Player {
                id: PlayerId(index),
                name,
                strategy: strategy.name().to_string(),
            };
            worms.insert(player.id, Worm::new(start, config.worm_length));
            players.push(player.clone());
            modules.push((player, strategy));
        }

        let coordinator =
            DecisionCoordinator::start(arena.clone(), modules, config.decision_timeout)?;

        tracing::info!(
            players = players.len(),
            width = arena.width(),
            height = arena.height(),
            max_turns = config.max_turns,
            "Game created"
        );

        Ok(Game {
            arena,
            config,
            players,
            worms,
            ledger: CollectibleLedger::new(),
            coordinator,
            rng,
            turn: 0,
            pending: BTreeMap::new(),
            phase: GamePhase::Init,
            last_turn_timings: TurnTimings::default(),
        })
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Number of the next turn to play; equals turns played once terminated.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn worm(&self, id: PlayerId) -> Option<&Worm> {
        self.worms.get(&id)
    }

    pub fn ledger(&self) -> &CollectibleLedger {
        &self.ledger
    }

    /// Active participants in creation order.
    pub fn active_players(&self) -> Vec<PlayerId> {
        self.worms
            .iter()
            .filter(|(_, w)| w.is_active())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn scores(&self) -> BTreeMap<PlayerId, i32> {
        self.worms.iter().map(|(id, w)| (*id, w.score())).collect()
    }

    /// Play turns until the game ends, then release the decision modules.
    pub async fn play(&mut self, sink: &mut dyn ReportSink) -> Result<EndReason, GameError> {
        let result = loop {
            match self.play_turn(sink).await {
                Ok(Some(reason)) => break Ok(reason),
                Ok(None) => continue,
                Err(e) => break Err(e),
            }
        };
        self.shutdown().await;
        if let Err(e) = &result {
            tracing::error!(turn = self.turn, "Game aborted: {e}");
        }
        result
    }

    /// Run one full turn: the seven phases, then the decision round for the
    /// next turn. Returns the end reason once the game is over.
    pub async fn play_turn(
        &mut self,
        sink: &mut dyn ReportSink,
    ) -> Result<Option<EndReason>, GameError> {
        match self.phase {
            GamePhase::Terminated(reason) => return Ok(Some(reason)),
            GamePhase::Reported => {
                return Err(GameError::Invariant("game was already reported".into()))
            }
            GamePhase::Init | GamePhase::Running(_) => {}
        }

        let turn_start = Instant::now();
        let turn = self.turn;
        self.phase = GamePhase::Running(turn);
        tracing::info!(turn, active = self.active_players().len(), "Starting turn");

        let mut events = Vec::new();
        self.deactivate_idle(turn, &mut events);
        self.apply_moves(turn, &mut events);
        self.resolve_collisions(turn, &mut events);
        self.reward_survivors(turn, &mut events);
        self.expire_collectibles(turn, &mut events)?;
        self.collect(turn, &mut events)?;
        self.distribute(turn, &mut events)?;

        for event in &events {
            tracing::debug!(turn, event = event.label(), "Applied event");
            sink.record(event);
        }

        // Stale answers must never carry over.
        self.pending.clear();
        let active = self.active_players();
        let solicit_start = Instant::now();
        let outcome = self.coordinator.solicit(turn, &events, &active).await;
        let solicit_ms = solicit_start.elapsed().as_secs_f64() * 1000.0;
        for (player, error) in &outcome.failures {
            sink.record(&TurnEvent::DecisionFailed {
                turn,
                player: *player,
                reason: error.to_string(),
            });
        }
        self.pending = outcome.moves;

        let total_ms = turn_start.elapsed().as_secs_f64() * 1000.0;
        metrics::TURN_DURATION_MS.observe(total_ms);
        self.last_turn_timings = TurnTimings {
            total_ms,
            solicit_ms,
        };
        let budget_ms = self.coordinator.budget().as_secs_f64() * 1000.0;
        if total_ms > budget_ms * 2.0 {
            tracing::warn!(
                turn,
                total_ms,
                solicit_ms,
                budget_ms,
                "Turn exceeded twice the decision budget"
            );
        }

        self.turn += 1;
        let end = if self.turn >= self.config.max_turns {
            Some(EndReason::TurnLimit)
        } else if active.len() < 2 {
            Some(EndReason::TooFewPlayers)
        } else {
            None
        };
        if let Some(reason) = end {
            self.phase = GamePhase::Terminated(reason);
            tracing::info!(
                turns = self.turn,
                end_reason = reason.label(),
                scores = ?self.scores(),
                "Game over"
            );
        }
        Ok(end)
    }

    /// Release every decision module. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        self.coordinator.terminate().await;
    }

    /// Mark the game as handed over to the report.
    pub fn mark_reported(&mut self) -> Result<(), GameError> {
        match self.phase {
            GamePhase::Terminated(_) => {
                self.phase = GamePhase::Reported;
                Ok(())
            }
            other => Err(GameError::Invariant(format!(
                "cannot report a game in phase {other:?}"
            ))),
        }
    }

    // ── Phases ───────────────────────────────────────────────────────

    /// Phase 1: worms that stood still too long leave the game.
    fn deactivate_idle(&mut self, turn: u32, events: &mut Vec<TurnEvent>) {
        let limit = self.config.max_inactive_turns;
        for (id, worm) in self.worms.iter_mut().filter(|(_, w)| w.is_active()) {
            if worm.inactive_turns() > limit {
                worm.deactivate();
                tracing::info!(turn, player = %id, idle = worm.inactive_turns(), "Player deactivated");
                metrics::PLAYERS_ELIMINATED_TOTAL
                    .with_label_values(&["deactivated"])
                    .inc();
                events.push(TurnEvent::PlayerDeactivated { turn, player: *id });
            }
        }
    }

    /// Phase 2: apply last turn's decisions. Turn 0 has none, so STAY.
    fn apply_moves(&mut self, turn: u32, events: &mut Vec<TurnEvent>) {
        for (id, worm) in self.worms.iter_mut().filter(|(_, w)| w.is_active()) {
            let direction = self.pending.get(id).copied().unwrap_or(Move::Stay);
            worm.advance(turn, direction);
            events.push(TurnEvent::PlayerMoved {
                turn,
                player: *id,
                direction,
                body: worm.body_vec(),
            });
        }
    }

    /// Phase 3: every crash is judged against the same post-move board.
    fn resolve_collisions(&mut self, turn: u32, events: &mut Vec<TurnEvent>) {
        let crashed: Vec<PlayerId> = self
            .worms
            .iter()
            .filter(|(_, w)| w.is_active())
            .filter(|(id, w)| self.has_crashed(**id, w.head()))
            .map(|(id, _)| *id)
            .collect();

        for id in crashed {
            if let Some(worm) = self.worms.get_mut(&id) {
                worm.deactivate();
                tracing::info!(turn, player = %id, head = %worm.head(), "Player crashed");
            }
            metrics::PLAYERS_ELIMINATED_TOTAL
                .with_label_values(&["crashed"])
                .inc();
            events.push(TurnEvent::PlayerCrashed { turn, player: id });
        }
    }

    fn has_crashed(&self, id: PlayerId, head: Node) -> bool {
        if !self.arena.contains(head) {
            return true;
        }
        self.worms
            .iter()
            .filter(|(_, w)| w.is_active())
            .any(|(other, w)| w.occupies(head, *other == id))
    }

    /// Phase 4: everyone still standing earns the bonus, except on turn 0.
    fn reward_survivors(&mut self, turn: u32, events: &mut Vec<TurnEvent>) {
        if turn == 0 {
            return;
        }
        let points = self.config.survival_bonus;
        for (id, worm) in self.worms.iter_mut().filter(|(_, w)| w.is_active()) {
            worm.reward(points);
            events.push(TurnEvent::SurvivalRewarded {
                turn,
                player: *id,
                points,
            });
        }
    }

    /// Phase 5.
    fn expire_collectibles(
        &mut self,
        turn: u32,
        events: &mut Vec<TurnEvent>,
    ) -> Result<(), GameError> {
        for (collectible, _) in self.ledger.expired(turn) {
            let node = self.ledger.remove(&collectible)?;
            tracing::debug!(turn, collectible = %collectible, node = %node, "Collectible expired");
            events.push(TurnEvent::CollectibleRemoved {
                turn,
                collectible,
                node,
            });
        }
        Ok(())
    }

    /// Phase 6: heads on a collectible eat it. Creation order settles ties,
    /// though crashes already remove every worm sharing a head node.
    fn collect(&mut self, turn: u32, events: &mut Vec<TurnEvent>) -> Result<(), GameError> {
        for (id, worm) in self.worms.iter_mut().filter(|(_, w)| w.is_active()) {
            let Some(collectible) = self.ledger.collectible_at(worm.head()) else {
                continue;
            };
            let node = self.ledger.remove(&collectible)?;
            worm.reward(collectible.points);
            worm.grow();
            tracing::debug!(turn, player = %id, collectible = %collectible, "Collectible collected");
            metrics::COLLECTIBLES_COLLECTED_TOTAL
                .with_label_values(&[collectible.kind.name()])
                .inc();
            events.push(TurnEvent::CollectibleCollected {
                turn,
                player: *id,
                collectible,
                node,
            });
        }
        Ok(())
    }

    /// Phase 7.
    fn distribute(&mut self, turn: u32, events: &mut Vec<TurnEvent>) -> Result<(), GameError> {
        let occupied: HashSet<Node> = self
            .worms
            .values()
            .filter(|w| w.is_active())
            .flat_map(|w| w.body())
            .collect();
        let added = self.ledger.distribute(
            &self.arena,
            &self.config.collectibles,
            &occupied,
            turn,
            &mut self.rng,
        )?;
        for (collectible, node) in added {
            metrics::COLLECTIBLES_SPAWNED_TOTAL
                .with_label_values(&[collectible.kind.name()])
                .inc();
            events.push(TurnEvent::CollectibleAdded {
                turn,
                collectible,
                node,
            });
        }
        Ok(())
    }

    /// Place a collectible directly, outside the spawn lottery.
    pub fn place_collectible(
        &mut self,
        collectible: Collectible,
        node: Node,
    ) -> Result<(), GameError> {
        if !self.arena.contains(node) {
            return Err(GameError::Invariant(format!(
                "collectible {collectible} placed off the arena at {node}"
            )));
        }
        self.ledger.place(collectible, node)?;
        Ok(())
    }
}
