//! Per-pair game sessions: the state machine and the task that drives it.
//!
//! A session is the exclusive owner of its two connections for as long as
//! it lives. All state mutation happens on the session's own task, which
//! `select!`s over both seats' inbound queues; concurrent guesses from the
//! two seats therefore serialize through one place and can never race on
//! the winner or the finish flags. The session never touches sockets
//! directly: outbound traffic is handed to the connections' writer queues.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration};

use shared::{ClientMessage, PlayerSummary, Seat, ServerMessage, MAX_ATTEMPTS, WORD_LENGTH};

use crate::connection::{Connection, InboundEvent, SendError};
use crate::lobby::LobbyCommand;
use crate::rematch::{RematchCoordinator, RematchDecision};
use crate::scoring::score_guess;
use crate::words::WordList;

/// Reason attached to `game_end` when a session was cut short.
const DISCONNECT_REASON: &str = "opponent_disconnected";
/// Farewell sent with the graceful close notice.
const GOODBYE_MESSAGE: &str = "Thanks for playing";

/// Knobs a session inherits from server configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long both seats get to answer the rematch question.
    pub rematch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            rematch_timeout: Duration::from_secs(30),
        }
    }
}

/// Session lifecycle. `Ended` is terminal; a rematch builds a new session
/// rather than rewinding this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Waiting,
    Playing,
    Finished,
    RematchPending,
    Ended,
}

/// What the lobby should do with the connections once a session has run
/// its course.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Both seats want another round; pair these two again right away.
    Rematch(Connection, Connection),
    /// One seat keeps playing and goes back to the queue tail.
    Requeue(Connection),
    /// Nobody left to pair; both endpoints are closed or closing.
    Closed,
}

/// Why a guess was rejected without consuming an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptError {
    WrongLength,
    NotInWordList,
    /// The seat already finished its round; extra guesses are ignored.
    SeatFinished,
}

impl AttemptError {
    pub fn reason(self) -> &'static str {
        match self {
            AttemptError::WrongLength => "word must be 5 letters",
            AttemptError::NotInWordList => "word is not in the word list",
            AttemptError::SeatFinished => "no attempts left",
        }
    }
}

/// One seat's record within a session.
#[derive(Debug)]
pub struct PlayerState {
    pub seat: Seat,
    pub attempts: u8,
    pub history: Vec<(String, [u8; WORD_LENGTH])>,
    pub finished: bool,
    pub won: bool,
}

impl PlayerState {
    fn new(seat: Seat) -> PlayerState {
        PlayerState {
            seat,
            attempts: 0,
            history: Vec::new(),
            finished: false,
            won: false,
        }
    }
}

/// Everything both seats need to hear about one accepted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub seat: Seat,
    pub word: String,
    pub verdict: [u8; WORD_LENGTH],
    pub attempt: u8,
    pub won: bool,
    pub finished: bool,
    pub game_finished: bool,
    pub winner: Option<Seat>,
}

/// Pure game state for one pair of seats. Only the owning session task
/// mutates it, so plain fields are enough.
#[derive(Debug)]
pub struct MatchState {
    target: String,
    players: [PlayerState; 2],
    winner: Option<Seat>,
    finished: bool,
}

impl MatchState {
    pub fn new(target: String) -> MatchState {
        MatchState {
            target,
            players: [PlayerState::new(1), PlayerState::new(2)],
            winner: None,
            finished: false,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn winner(&self) -> Option<Seat> {
        self.winner
    }

    /// Session-level finish: first win, or both seats individually done.
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn player(&self, seat: Seat) -> &PlayerState {
        &self.players[(seat - 1) as usize]
    }

    /// Applies one guess for `seat`. Validation failures consume nothing.
    /// An accepted guess always increments the seat's attempt counter,
    /// including a word the seat already tried.
    pub fn apply_attempt(
        &mut self,
        seat: Seat,
        word: &str,
        words: &WordList,
    ) -> Result<AttemptOutcome, AttemptError> {
        if self.player(seat).finished {
            return Err(AttemptError::SeatFinished);
        }

        let word = word.trim().to_ascii_uppercase();
        if word.len() != WORD_LENGTH || !word.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(AttemptError::WrongLength);
        }
        if !words.is_valid(&word) {
            return Err(AttemptError::NotInWordList);
        }

        let verdict = score_guess(&word, &self.target);
        let won = word == self.target;

        let player = &mut self.players[(seat - 1) as usize];
        player.attempts += 1;
        let attempt = player.attempts;
        player.history.push((word.clone(), verdict));
        player.won = won;
        player.finished = won || attempt >= MAX_ATTEMPTS;
        let finished = player.finished;

        // First winning guess through here takes the session. A win that
        // arrives after the session is decided stays on the seat's record
        // without touching the winner.
        if won && self.winner.is_none() && !self.finished {
            self.winner = Some(seat);
            self.finished = true;
        }
        if self.players.iter().all(|player| player.finished) {
            self.finished = true;
        }

        Ok(AttemptOutcome {
            seat,
            word,
            verdict,
            attempt,
            won,
            finished,
            game_finished: self.finished,
            winner: self.winner,
        })
    }
}

/// Runs one session to completion and reports the resolution back to the
/// lobby, which decides what the connections do next.
pub async fn run_session(
    session_id: u64,
    target: String,
    first: Connection,
    second: Connection,
    words: Arc<WordList>,
    config: SessionConfig,
    lobby: mpsc::UnboundedSender<LobbyCommand>,
) {
    let session = ActiveSession::new(session_id, target, first, second, words, config);
    let outcome = session.run().await;
    if lobby
        .send(LobbyCommand::SessionResolved {
            session_id,
            outcome,
        })
        .is_err()
    {
        debug!("session {}: lobby is gone, dropping the resolution", session_id);
    }
}

struct ActiveSession {
    id: u64,
    game: MatchState,
    phase: SessionState,
    seats: [Connection; 2],
    words: Arc<WordList>,
    config: SessionConfig,
    end_reason: Option<&'static str>,
}

fn opponent_of(seat: Seat) -> Seat {
    if seat == 1 {
        2
    } else {
        1
    }
}

impl ActiveSession {
    fn new(
        id: u64,
        target: String,
        first: Connection,
        second: Connection,
        words: Arc<WordList>,
        config: SessionConfig,
    ) -> ActiveSession {
        ActiveSession {
            id,
            game: MatchState::new(target),
            phase: SessionState::Waiting,
            seats: [first, second],
            words,
            config,
            end_reason: None,
        }
    }

    async fn run(mut self) -> SessionOutcome {
        if self.handshake().is_err() {
            warn!(
                "session {}: a seat vanished during the handshake, aborting",
                self.id
            );
            self.set_phase(SessionState::Ended);
            return SessionOutcome::Closed;
        }

        self.set_phase(SessionState::Playing);
        info!("session {}: started", self.id);

        self.play().await;
        self.set_phase(SessionState::Finished);

        self.announce_result();
        let decision = self.collect_rematch_answers().await;
        self.set_phase(SessionState::Ended);
        self.resolve(decision)
    }

    fn set_phase(&mut self, phase: SessionState) {
        debug!("session {}: {:?} -> {:?}", self.id, self.phase, phase);
        self.phase = phase;
    }

    fn send_to(&self, seat: Seat, message: &ServerMessage) -> Result<(), SendError> {
        self.seats[(seat - 1) as usize].send(message)
    }

    /// Seat assignments and the start notice. The session only advances
    /// once every frame was accepted; a dead connection here aborts the
    /// pairing with nobody requeued.
    fn handshake(&self) -> Result<(), SendError> {
        for seat in [1u8, 2u8] {
            let opponent = opponent_of(seat);
            self.send_to(
                seat,
                &ServerMessage::PlayerId {
                    player_id: seat,
                    opponent_id: Some(opponent),
                    waiting_for: false,
                },
            )?;
            self.send_to(
                seat,
                &ServerMessage::GameStart {
                    opponent_id: opponent,
                },
            )?;
        }
        Ok(())
    }

    /// Consumes attempts from both seats until the session finishes or a
    /// connection dies. Attempts from one seat arrive in receipt order;
    /// across seats, whichever guess this task picks up first wins any
    /// tie.
    async fn play(&mut self) {
        loop {
            let [first, second] = &mut self.seats;
            let (seat, event) = tokio::select! {
                event = first.next_event() => (1u8, event),
                event = second.next_event() => (2u8, event),
            };

            match event {
                InboundEvent::Disconnected => {
                    info!("session {}: seat {} disconnected mid-game", self.id, seat);
                    self.end_reason = Some(DISCONNECT_REASON);
                    return;
                }
                InboundEvent::Message(ClientMessage::Attempt { word }) => {
                    if self.handle_attempt(seat, word) {
                        return;
                    }
                }
                InboundEvent::Message(other) => {
                    debug!(
                        "session {}: ignoring {:?} from seat {} while playing",
                        self.id, other, seat
                    );
                }
            }
        }
    }

    /// Returns true once the session-level game is over.
    fn handle_attempt(&mut self, seat: Seat, word: String) -> bool {
        let outcome = match self.game.apply_attempt(seat, &word, &self.words) {
            Ok(outcome) => outcome,
            Err(AttemptError::SeatFinished) => {
                debug!(
                    "session {}: seat {} kept guessing after finishing",
                    self.id, seat
                );
                return false;
            }
            Err(error) => {
                debug!(
                    "session {}: rejected {:?} from seat {}: {}",
                    self.id,
                    word,
                    seat,
                    error.reason()
                );
                let notice = ServerMessage::InvalidWord {
                    word,
                    reason: Some(error.reason().to_string()),
                };
                if self.send_to(seat, &notice).is_err() {
                    self.end_reason = Some(DISCONNECT_REASON);
                    return true;
                }
                return false;
            }
        };

        if outcome.won {
            info!(
                "session {}: seat {} guessed the word on attempt {}",
                self.id, seat, outcome.attempt
            );
        }

        let result = ServerMessage::AttemptResult {
            word: outcome.word.clone(),
            result: outcome.verdict,
            attempt: outcome.attempt,
            won: outcome.won,
            finished: outcome.finished,
            game_finished: outcome.game_finished,
            winner: outcome.winner,
        };
        if self.send_to(seat, &result).is_err() && !self.game.finished() {
            self.end_reason = Some(DISCONNECT_REASON);
            return true;
        }

        let progress = ServerMessage::OpponentProgress {
            opponent_id: seat,
            attempt: outcome.attempt,
            won: outcome.won,
            finished: outcome.finished,
        };
        if self.send_to(opponent_of(seat), &progress).is_err() && !self.game.finished() {
            self.end_reason = Some(DISCONNECT_REASON);
            return true;
        }

        self.game.finished()
    }

    /// Final summary plus the rematch question, for every seat still on
    /// the wire.
    fn announce_result(&self) {
        let summary = ServerMessage::GameEnd {
            target_word: self.game.target().to_string(),
            winner: self.game.winner(),
            reason: self.end_reason.map(str::to_string),
            players: [1u8, 2u8]
                .iter()
                .map(|&seat| {
                    let player = self.game.player(seat);
                    PlayerSummary {
                        id: seat,
                        attempts: player.attempts,
                        won: player.won,
                    }
                })
                .collect(),
        };

        info!(
            "session {}: over, winner {:?}, target was {}",
            self.id,
            self.game.winner(),
            self.game.target()
        );

        for seat in [1u8, 2u8] {
            if self.seats[(seat - 1) as usize].is_alive() {
                let _ = self.send_to(seat, &summary);
                let _ = self.send_to(seat, &ServerMessage::AskNewGame);
            }
        }
    }

    /// One answer per connected seat, bounded by the deadline; silence
    /// and disconnects count as "no".
    async fn collect_rematch_answers(&mut self) -> RematchDecision {
        self.set_phase(SessionState::RematchPending);
        let connected = [self.seats[0].is_alive(), self.seats[1].is_alive()];
        let mut pending = RematchCoordinator::new(connected, self.config.rematch_timeout);

        while !pending.resolved() {
            let [first, second] = &mut self.seats;
            let (seat, event) = tokio::select! {
                _ = sleep_until(pending.deadline()) => {
                    debug!("session {}: rematch deadline passed", self.id);
                    break;
                }
                event = first.next_event(), if pending.awaiting(1) => (1u8, event),
                event = second.next_event(), if pending.awaiting(2) => (2u8, event),
            };

            match event {
                InboundEvent::Message(ClientMessage::NewGameResponse { answer }) => {
                    debug!(
                        "session {}: seat {} answered the rematch question: {}",
                        self.id, seat, answer
                    );
                    pending.record_answer(seat, answer);
                }
                InboundEvent::Disconnected => {
                    debug!("session {}: seat {} left before answering", self.id, seat);
                    pending.record_answer(seat, false);
                }
                InboundEvent::Message(other) => {
                    debug!(
                        "session {}: ignoring {:?} from seat {} during negotiation",
                        self.id, other, seat
                    );
                }
            }
        }

        pending.decision()
    }

    /// Hands the connections back according to the decision. Departing
    /// seats get the graceful close notice and are dropped, which closes
    /// their sockets once the writer queue drains.
    fn resolve(self, decision: RematchDecision) -> SessionOutcome {
        let [first, second] = self.seats;
        match decision {
            RematchDecision::BothYes => SessionOutcome::Rematch(first, second),
            RematchDecision::OneYes(seat) => {
                let (stayer, leaver) = if seat == 1 {
                    (first, second)
                } else {
                    (second, first)
                };
                let _ = stayer.send(&ServerMessage::Waiting);
                let _ = leaver.send(&ServerMessage::Disconnect {
                    message: GOODBYE_MESSAGE.to_string(),
                });
                SessionOutcome::Requeue(stayer)
            }
            RematchDecision::NoneYes => {
                for connection in [first, second] {
                    if connection.is_alive() {
                        let _ = connection.send(&ServerMessage::Disconnect {
                            message: GOODBYE_MESSAGE.to_string(),
                        });
                    }
                }
                SessionOutcome::Closed
            }
        }
    }
}
