//! # Wordle Duel Server Library
//!
//! Server-side engine for a real-time two-player word-guessing contest.
//! Players connect over persistent TCP, wait in a FIFO matchmaking queue,
//! and are paired two at a time into sessions that race to the same
//! secret five-letter word. Each guess is scored per letter, the opponent
//! sees progress without ever seeing the guess itself, and after a round
//! the pair negotiates whether to play again.
//!
//! ## Architecture
//!
//! Every piece of mutable state has exactly one owning task:
//!
//! - Each connection runs a reader task (framing inbound bytes into
//!   messages) and a writer task (draining an ordered outbound queue), so
//!   game logic never blocks on socket I/O.
//! - The lobby task is the sole accessor of the matchmaking queue and the
//!   active-session registry; everything else reaches it over a command
//!   channel.
//! - Each session task exclusively owns its two connections and all game
//!   state, consuming both seats' inbound queues from a single `select!`
//!   loop. Concurrent guesses serialize there, which is what makes the
//!   first-win tie-break well defined.
//!
//! Failure handling is deliberately blunt: a write failure or read error
//! marks the connection dead once, the owning session finishes with a
//! disconnect reason, and nobody retries anything. The only recovery path
//! is a brand-new connection.
//!
//! ## Module Organization
//!
//! - [`connection`]: framing, send queue, and liveness for one socket
//! - [`listener`]: accept loop that greets and registers connections
//! - [`lobby`]: matchmaking queue, session registry, pairing
//! - [`session`]: the per-pair state machine and its owning task
//! - [`scoring`]: pure per-letter guess scoring
//! - [`rematch`]: post-round negotiation with a deadline
//! - [`words`]: word list loading, target drawing, guess validation

pub mod connection;
pub mod listener;
pub mod lobby;
pub mod rematch;
pub mod scoring;
pub mod session;
pub mod words;
