use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Every target word and every accepted guess is exactly this long.
pub const WORD_LENGTH: usize = 5;
/// Guesses a seat gets before it is finished for the round.
pub const MAX_ATTEMPTS: u8 = 6;

/// Verdict code: the letter does not occur (or its occurrences are already
/// accounted for).
pub const ABSENT: u8 = 0;
/// Verdict code: the letter occurs at a different position.
pub const PRESENT: u8 = 1;
/// Verdict code: the letter is at exactly this position.
pub const CORRECT: u8 = 2;

/// A player's numeric role within a session, 1 or 2. Independent of the
/// underlying connection, so a rematch can reuse the same seat numbers.
pub type Seat = u8;

/// Frames are single JSON records terminated by this byte.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Messages a client may send to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Attempt {
        word: String,
    },
    NewGameResponse {
        answer: bool,
    },
}

/// Messages the server may send to a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Waiting,
    PlayerId {
        player_id: Seat,
        #[serde(skip_serializing_if = "Option::is_none")]
        opponent_id: Option<Seat>,
        waiting_for: bool,
    },
    GameStart {
        opponent_id: Seat,
    },
    AttemptResult {
        word: String,
        result: [u8; WORD_LENGTH],
        attempt: u8,
        won: bool,
        finished: bool,
        game_finished: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<Seat>,
    },
    OpponentProgress {
        opponent_id: Seat,
        attempt: u8,
        won: bool,
        finished: bool,
    },
    InvalidWord {
        word: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    GameEnd {
        target_word: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<Seat>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        players: Vec<PlayerSummary>,
    },
    AskNewGame,
    Disconnect {
        message: String,
    },
}

/// Per-seat record carried by the final `game_end` summary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: Seat,
    pub attempts: u8,
    pub won: bool,
}

/// Serializes one message as a complete frame, delimiter included.
pub fn encode_frame<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut frame = serde_json::to_string(message)?;
    frame.push(FRAME_DELIMITER as char);
    Ok(frame)
}

/// Decodes one frame; surrounding whitespace and the trailing delimiter
/// are ignored.
pub fn decode_frame<T: DeserializeOwned>(frame: &str) -> serde_json::Result<T> {
    serde_json::from_str(frame.trim())
}
