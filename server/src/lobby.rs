//! Matchmaking queue and the lobby actor that owns it.
//!
//! The waiting queue and the registry of active sessions are process-wide
//! state. Instead of guarding them with locks, one lobby task is their
//! sole accessor: the listener and the session tasks talk to it through a
//! command channel, so enqueueing, pairing, and rematch resolution all
//! serialize in one place.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::connection::Connection;
use crate::session::{run_session, SessionConfig, SessionOutcome};
use crate::words::WordList;

/// FIFO of connections waiting for an opponent. Insertion order is
/// pairing priority; a connection that died while waiting is discarded
/// the next time a pair is drained.
pub struct MatchQueue {
    waiting: VecDeque<Connection>,
}

impl MatchQueue {
    pub fn new() -> MatchQueue {
        MatchQueue {
            waiting: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Appends to the tail.
    pub fn enqueue(&mut self, connection: Connection) {
        self.waiting.push_back(connection);
    }

    /// Pops the two oldest live connections, earliest first, or returns
    /// nothing if fewer than two are left after discarding dead entries.
    pub fn drain_pair_if_ready(&mut self) -> Option<(Connection, Connection)> {
        self.waiting.retain(|connection| {
            if connection.is_alive() {
                true
            } else {
                debug!(
                    "connection {} left the queue before being paired",
                    connection.id()
                );
                false
            }
        });

        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?;
        let second = self.waiting.pop_front()?;
        Some((first, second))
    }
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands other tasks may send to the lobby.
#[derive(Debug)]
pub enum LobbyCommand {
    /// A freshly accepted connection, already greeted, ready to wait for
    /// an opponent.
    Register(Connection),
    /// A session ran its whole lifecycle and reports what to do with the
    /// connections it owned.
    SessionResolved {
        session_id: u64,
        outcome: SessionOutcome,
    },
}

/// Cloneable entry point to the lobby task.
#[derive(Clone)]
pub struct LobbyHandle {
    tx: mpsc::UnboundedSender<LobbyCommand>,
}

impl LobbyHandle {
    pub fn register(&self, connection: Connection) {
        if self.tx.send(LobbyCommand::Register(connection)).is_err() {
            warn!("lobby is gone; dropping a new connection");
        }
    }
}

/// The owning service for matchmaking state. Runs until every handle and
/// every session is gone.
pub struct Lobby {
    queue: MatchQueue,
    active_sessions: HashMap<u64, Instant>,
    next_session_id: u64,
    words: Arc<WordList>,
    config: SessionConfig,
    tx: mpsc::UnboundedSender<LobbyCommand>,
    rx: mpsc::UnboundedReceiver<LobbyCommand>,
}

impl Lobby {
    pub fn new(words: Arc<WordList>, config: SessionConfig) -> (LobbyHandle, Lobby) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = LobbyHandle { tx: tx.clone() };
        let lobby = Lobby {
            queue: MatchQueue::new(),
            active_sessions: HashMap::new(),
            next_session_id: 0,
            words,
            config,
            tx,
            rx,
        };
        (handle, lobby)
    }

    /// Processes commands in arrival order. All queue and registry access
    /// happens on this task.
    pub async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                LobbyCommand::Register(connection) => {
                    debug!("connection {} is waiting for an opponent", connection.id());
                    self.queue.enqueue(connection);
                    self.try_pair();
                }
                LobbyCommand::SessionResolved {
                    session_id,
                    outcome,
                } => {
                    self.active_sessions.remove(&session_id);
                    self.apply_outcome(outcome);
                    info!("{} active sessions", self.active_sessions.len());
                }
            }
        }
    }

    fn try_pair(&mut self) {
        while let Some((first, second)) = self.queue.drain_pair_if_ready() {
            self.spawn_session(first, second);
        }
    }

    fn apply_outcome(&mut self, outcome: SessionOutcome) {
        match outcome {
            SessionOutcome::Rematch(first, second) => {
                info!(
                    "connections {} and {} agreed on a rematch",
                    first.id(),
                    second.id()
                );
                self.spawn_session(first, second);
            }
            SessionOutcome::Requeue(connection) => {
                info!("connection {} returns to the queue", connection.id());
                self.queue.enqueue(connection);
                self.try_pair();
            }
            SessionOutcome::Closed => {}
        }
    }

    fn spawn_session(&mut self, first: Connection, second: Connection) {
        self.next_session_id += 1;
        let session_id = self.next_session_id;
        let target = self.words.random_word();

        info!(
            "session {}: pairing connections {} and {}",
            session_id,
            first.id(),
            second.id()
        );
        self.active_sessions.insert(session_id, Instant::now());

        tokio::spawn(run_session(
            session_id,
            target,
            first,
            second,
            Arc::clone(&self.words),
            self.config.clone(),
            self.tx.clone(),
        ));
    }
}
