// Decision coordinator: fans each turn's events out to the participants'
// decision modules and collects one move per participant under a time budget.
//
// Every module runs on a dedicated OS thread (modules may block and need not
// be Sync). Each request carries its own oneshot reply channel, so an answer
// that arrives after the budget lands in a dropped receiver and is discarded.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};

use super::arena::{Arena, Move};
use super::event::TurnEvent;
use super::player::{Player, PlayerId};
use super::strategy::{GameContext, Strategy, StrategyError};
use crate::error::{DecisionError, SetupError};
use crate::metrics;

struct DecisionRequest {
    turn: u32,
    events: Arc<Vec<TurnEvent>>,
    reply: oneshot::Sender<Result<Move, DecisionError>>,
}

struct Worker {
    name: String,
    requests: Option<mpsc::UnboundedSender<DecisionRequest>>,
    finished: Option<oneshot::Receiver<()>>,
}

/// Outcome of one solicitation round.
#[derive(Debug, Default)]
pub struct Solicitation {
    /// One move per solicited participant; failures are already STAY.
    pub moves: BTreeMap<PlayerId, Move>,
    pub failures: Vec<(PlayerId, DecisionError)>,
}

pub struct DecisionCoordinator {
    workers: BTreeMap<PlayerId, Worker>,
    budget: Duration,
    terminated: bool,
}

impl DecisionCoordinator {
    /// Start one worker per participant. Each module's `start` runs on its
    /// worker before the first request is served.
    pub fn start(
        arena: Arc<Arena>,
        entries: Vec<(Player, Box<dyn Strategy>)>,
        budget: Duration,
    ) -> Result<Self, SetupError> {
        let players: Vec<Player> = entries.iter().map(|(p, _)| p.clone()).collect();
        let mut workers = BTreeMap::new();

        for (player, strategy) in entries {
            let ctx = GameContext {
                player: player.id,
                players: players.clone(),
                arena: arena.clone(),
            };
            let (tx, rx) = mpsc::unbounded_channel();
            let (done_tx, done_rx) = oneshot::channel();

            std::thread::Builder::new()
                .name(format!("decision-{}", player.id.0))
                .spawn(move || run_worker(strategy, ctx, rx, done_tx))
                .map_err(|e| SetupError::Worker(format!("{}: {e}", player.name)))?;

            workers.insert(
                player.id,
                Worker {
                    name: player.name,
                    requests: Some(tx),
                    finished: Some(done_rx),
                },
            );
        }

        Ok(Self {
            workers,
            budget,
            terminated: false,
        })
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Deliver `events` to every participant in `active` and wait, per
    /// participant, until it answers or the budget runs out. Failed or late
    /// participants get STAY.
    pub async fn solicit(
        &mut self,
        turn: u32,
        events: &[TurnEvent],
        active: &[PlayerId],
    ) -> Solicitation {
        let events = Arc::new(events.to_vec());
        let budget = self.budget;

        let pending: Vec<_> = active
            .iter()
            .map(|&pid| {
                let reply = self.dispatch(pid, turn, events.clone());
                async move {
                    let answer = match reply {
                        Err(e) => Err(e),
                        Ok(rx) => match tokio::time::timeout(budget, rx).await {
                            Ok(Ok(answer)) => answer,
                            Ok(Err(_)) => Err(DecisionError::Disconnected),
                            Err(_) => Err(DecisionError::Timeout(budget)),
                        },
                    };
                    (pid, answer)
                }
            })
            .collect();

        let mut outcome = Solicitation::default();
        for (pid, answer) in join_all(pending).await {
            let m = match answer {
                Ok(m) => m,
                Err(e) => {
                    let player_name = self.workers.get(&pid).map(|w| w.name.as_str()).unwrap_or("");
                    tracing::warn!(turn, player = %pid, player_name, "Decision replaced by STAY: {e}");
                    metrics::DECISION_FAILURES_TOTAL
                        .with_label_values(&[e.reason()])
                        .inc();
                    outcome.failures.push((pid, e));
                    Move::Stay
                }
            };
            outcome.moves.insert(pid, m);
        }
        outcome
    }

    fn dispatch(
        &self,
        pid: PlayerId,
        turn: u32,
        events: Arc<Vec<TurnEvent>>,
    ) -> Result<oneshot::Receiver<Result<Move, DecisionError>>, DecisionError> {
        let sender = self
            .workers
            .get(&pid)
            .and_then(|w| w.requests.as_ref())
            .ok_or(DecisionError::Disconnected)?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(DecisionRequest {
                turn,
                events,
                reply,
            })
            .map_err(|_| DecisionError::Disconnected)?;
        Ok(rx)
    }

    /// Close every module. Safe to call more than once and after modules
    /// have failed; waits at most one budget per module.
    pub async fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        // Dropping the senders ends each worker loop.
        for worker in self.workers.values_mut() {
            worker.requests.take();
        }
        for (pid, worker) in self.workers.iter_mut() {
            let Some(finished) = worker.finished.take() else {
                continue;
            };
            if tokio::time::timeout(self.budget, finished).await.is_err() {
                tracing::warn!(
                    player = %pid,
                    player_name = %worker.name,
                    "Decision module still busy at shutdown"
                );
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

fn run_worker(
    mut strategy: Box<dyn Strategy>,
    ctx: GameContext,
    mut requests: mpsc::UnboundedReceiver<DecisionRequest>,
    finished: oneshot::Sender<()>,
) {
    let broken = match catch_unwind(AssertUnwindSafe(|| strategy.start(&ctx))) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(panic) => Some(panic_message(panic)),
    };
    if let Some(reason) = &broken {
        tracing::error!(player = %ctx.player, "Decision module failed to start: {reason}");
    }

    while let Some(DecisionRequest {
        turn,
        events,
        reply,
    }) = requests.blocking_recv()
    {
        if let Some(reason) = &broken {
            let _ = reply.send(Err(DecisionError::Malfunction(reason.clone())));
            continue;
        }

        let result = catch_unwind(AssertUnwindSafe(|| {
            strategy.notify(turn, &events);
            // Nobody is waiting any more; keep the history, skip the work.
            if reply.is_closed() {
                return None;
            }
            Some(strategy.decide(turn))
        }));

        let answer = match result {
            Ok(None) => continue,
            Ok(Some(Ok(m))) => Ok(m),
            Ok(Some(Err(e @ (StrategyError::NoDecision | StrategyError::Ambiguous(_))))) => {
                Err(DecisionError::Invalid(e.to_string()))
            }
            Ok(Some(Err(e))) => Err(DecisionError::Malfunction(e.to_string())),
            Err(panic) => Err(DecisionError::Malfunction(panic_message(panic))),
        };
        // Fails only when the answer came too late.
        let _ = reply.send(answer);
    }

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| strategy.shutdown())) {
        tracing::warn!(player = %ctx.player, "Decision module panicked on shutdown: {}", panic_message(panic));
    }
    let _ = finished.send(());
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
