//! Integration tests for the duel server
//!
//! These tests exercise the real TCP surface: a listener on an ephemeral
//! port, the lobby task, and full sessions driven by scripted clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use server::listener::serve;
use server::lobby::Lobby;
use server::session::SessionConfig;
use server::words::WordList;
use shared::{encode_frame, ClientMessage, PlayerSummary, ServerMessage};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a full server (lobby + accept loop) on an ephemeral port with a
/// fixed corpus, so every session's target word is predictable.
async fn spawn_server(
    playable: &[&str],
    extra_valid: &[&str],
    rematch_timeout: Duration,
) -> SocketAddr {
    let words = Arc::new(WordList::from_parts(
        playable.iter().copied(),
        extra_valid.iter().copied(),
    ));
    let (handle, lobby) = Lobby::new(words, SessionConfig { rematch_timeout });
    tokio::spawn(lobby.run());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve(listener, handle, Duration::from_secs(60)).await;
    });

    addr
}

struct TestClient {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> TestClient {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        TestClient {
            reader: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn recv(&mut self) -> ServerMessage {
        let line = timeout(RECV_TIMEOUT, self.reader.next_line())
            .await
            .expect("timed out waiting for a server message")
            .unwrap()
            .expect("server closed the connection");
        serde_json::from_str(&line).expect("undecodable server message")
    }

    async fn send(&mut self, message: &ClientMessage) {
        self.writer
            .write_all(encode_frame(message).unwrap().as_bytes())
            .await
            .unwrap();
    }

    async fn guess(&mut self, word: &str) {
        self.send(&ClientMessage::Attempt {
            word: word.to_string(),
        })
        .await;
    }

    async fn answer_rematch(&mut self, answer: bool) {
        self.send(&ClientMessage::NewGameResponse { answer }).await;
    }

    /// Asserts that nothing arrives for `window`.
    async fn assert_silent(&mut self, window: Duration) {
        if let Ok(line) = timeout(window, self.reader.next_line()).await {
            panic!("expected silence, got {:?}", line);
        }
    }
}

/// Connects and consumes the initial `waiting` greeting. Awaiting the
/// greeting before connecting the next client pins the accept order, and
/// with it the FIFO pairing order.
async fn connect_and_wait(addr: SocketAddr) -> TestClient {
    let mut client = TestClient::connect(addr).await;
    assert!(matches!(client.recv().await, ServerMessage::Waiting));
    client
}

/// Consumes the session handshake and checks the seat assignment.
async fn expect_game_started(client: &mut TestClient, expected_seat: u8) {
    let expected_opponent = if expected_seat == 1 { 2 } else { 1 };
    match client.recv().await {
        ServerMessage::PlayerId {
            player_id,
            opponent_id,
            waiting_for,
        } => {
            assert_eq!(player_id, expected_seat);
            assert_eq!(opponent_id, Some(expected_opponent));
            assert!(!waiting_for);
        }
        other => panic!("expected player_id, got {:?}", other),
    }
    match client.recv().await {
        ServerMessage::GameStart { opponent_id } => assert_eq!(opponent_id, expected_opponent),
        other => panic!("expected game_start, got {:?}", other),
    }
}

/// Connects two clients and plays them into a running session.
async fn start_pair(addr: SocketAddr) -> (TestClient, TestClient) {
    let mut first = connect_and_wait(addr).await;
    let mut second = connect_and_wait(addr).await;
    expect_game_started(&mut first, 1).await;
    expect_game_started(&mut second, 2).await;
    (first, second)
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn attempt_result_serializes_per_catalogue() {
        let message = ServerMessage::AttemptResult {
            word: "CRATE".to_string(),
            result: [2, 2, 2, 0, 2],
            attempt: 1,
            won: false,
            finished: false,
            game_finished: false,
            winner: None,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "attempt_result");
        assert_eq!(value["result"], serde_json::json!([2, 2, 2, 0, 2]));
        assert!(value.get("winner").is_none());
    }

    #[tokio::test]
    async fn client_messages_roundtrip_through_frames() {
        let messages = vec![
            ClientMessage::Attempt {
                word: "AROSE".to_string(),
            },
            ClientMessage::NewGameResponse { answer: false },
        ];

        for message in messages {
            let frame = encode_frame(&message).unwrap();
            assert!(frame.ends_with('\n'));
            let decoded: ClientMessage = serde_json::from_str(frame.trim()).unwrap();
            assert_eq!(decoded, message);
        }
    }
}

/// SCORING TESTS against the public engine
mod scoring_tests {
    use server::scoring::score_guess;

    #[test]
    fn known_verdict_vectors() {
        assert_eq!(score_guess("CRATE", "CRANE"), [2, 2, 2, 0, 2]);
        assert_eq!(score_guess("LOYAL", "ALLOY"), [1, 1, 1, 1, 1]);
        assert_eq!(score_guess("CRANE", "CRANE"), [2, 2, 2, 2, 2]);
    }

    #[test]
    fn repeated_letters_stay_bounded() {
        // One E in the target; three in the guess get one mark total.
        let verdict = score_guess("EEEEE", "CRANE");
        let marks = verdict.iter().filter(|&&code| code != 0).count();
        assert_eq!(marks, 1);
    }
}

/// MATCHMAKING TESTS
mod matchmaking_tests {
    use super::*;

    #[tokio::test]
    async fn pairs_connections_fifo() {
        let addr = spawn_server(&["CRANE"], &["SLATE"], Duration::from_secs(5)).await;

        let mut first = connect_and_wait(addr).await;
        let mut second = connect_and_wait(addr).await;
        expect_game_started(&mut first, 1).await;
        expect_game_started(&mut second, 2).await;

        let mut third = connect_and_wait(addr).await;
        let mut fourth = connect_and_wait(addr).await;
        expect_game_started(&mut third, 1).await;
        expect_game_started(&mut fourth, 2).await;

        // A guess in the first session reaches only that session's
        // opponent; the second pair hears nothing.
        first.guess("SLATE").await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::AttemptResult { attempt: 1, .. }
        ));
        match second.recv().await {
            ServerMessage::OpponentProgress {
                opponent_id,
                attempt,
                ..
            } => {
                assert_eq!(opponent_id, 1);
                assert_eq!(attempt, 1);
            }
            other => panic!("expected opponent_progress, got {:?}", other),
        }
        third.assert_silent(Duration::from_millis(200)).await;
        fourth.assert_silent(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn connection_dead_while_waiting_is_skipped() {
        let addr = spawn_server(&["CRANE"], &[], Duration::from_secs(5)).await;

        let doomed = connect_and_wait(addr).await;
        drop(doomed);
        // Let the server notice the close before anyone else lines up.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut first = connect_and_wait(addr).await;
        let mut second = connect_and_wait(addr).await;
        expect_game_started(&mut first, 1).await;
        expect_game_started(&mut second, 2).await;
    }
}

/// GAME FLOW TESTS
mod game_flow_tests {
    use super::*;

    #[tokio::test]
    async fn guesses_are_scored_and_mirrored() {
        let addr = spawn_server(&["CRANE"], &["CRATE"], Duration::from_secs(5)).await;
        let (mut first, mut second) = start_pair(addr).await;

        first.guess("CRATE").await;

        match first.recv().await {
            ServerMessage::AttemptResult {
                word,
                result,
                attempt,
                won,
                finished,
                game_finished,
                winner,
            } => {
                assert_eq!(word, "CRATE");
                assert_eq!(result, [2, 2, 2, 0, 2]);
                assert_eq!(attempt, 1);
                assert!(!won);
                assert!(!finished);
                assert!(!game_finished);
                assert_eq!(winner, None);
            }
            other => panic!("expected attempt_result, got {:?}", other),
        }

        match second.recv().await {
            ServerMessage::OpponentProgress {
                opponent_id,
                attempt,
                won,
                finished,
            } => {
                assert_eq!(opponent_id, 1);
                assert_eq!(attempt, 1);
                assert!(!won);
                assert!(!finished);
            }
            other => panic!("expected opponent_progress, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_words_consume_no_attempt() {
        let addr = spawn_server(&["CRANE"], &["CRATE"], Duration::from_secs(5)).await;
        let (mut first, _second) = start_pair(addr).await;

        first.guess("ABC").await;
        match first.recv().await {
            ServerMessage::InvalidWord { word, reason } => {
                assert_eq!(word, "ABC");
                assert!(reason.is_some());
            }
            other => panic!("expected invalid_word, got {:?}", other),
        }

        first.guess("XYZZY").await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::InvalidWord { .. }
        ));

        // The first accepted guess is still attempt number one.
        first.guess("CRATE").await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::AttemptResult { attempt: 1, .. }
        ));
    }

    #[tokio::test]
    async fn resubmitting_a_guess_counts_twice() {
        let addr = spawn_server(&["CRANE"], &["CRATE"], Duration::from_secs(5)).await;
        let (mut first, _second) = start_pair(addr).await;

        first.guess("CRATE").await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::AttemptResult { attempt: 1, .. }
        ));

        first.guess("CRATE").await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::AttemptResult { attempt: 2, .. }
        ));
    }

    #[tokio::test]
    async fn winning_finishes_the_session_for_both() {
        let addr = spawn_server(&["CRANE"], &[], Duration::from_secs(5)).await;
        let (mut first, mut second) = start_pair(addr).await;

        first.guess("CRANE").await;

        match first.recv().await {
            ServerMessage::AttemptResult {
                won,
                finished,
                game_finished,
                winner,
                ..
            } => {
                assert!(won);
                assert!(finished);
                assert!(game_finished);
                assert_eq!(winner, Some(1));
            }
            other => panic!("expected attempt_result, got {:?}", other),
        }

        match second.recv().await {
            ServerMessage::OpponentProgress { won, finished, .. } => {
                assert!(won);
                assert!(finished);
            }
            other => panic!("expected opponent_progress, got {:?}", other),
        }

        for client in [&mut first, &mut second] {
            match client.recv().await {
                ServerMessage::GameEnd {
                    target_word,
                    winner,
                    reason,
                    players,
                } => {
                    assert_eq!(target_word, "CRANE");
                    assert_eq!(winner, Some(1));
                    assert_eq!(reason, None);
                    assert_eq!(
                        players,
                        vec![
                            PlayerSummary {
                                id: 1,
                                attempts: 1,
                                won: true
                            },
                            PlayerSummary {
                                id: 2,
                                attempts: 0,
                                won: false
                            },
                        ]
                    );
                }
                other => panic!("expected game_end, got {:?}", other),
            }
            assert!(matches!(client.recv().await, ServerMessage::AskNewGame));
        }

        // Nobody wants a rematch; both get the goodbye.
        first.answer_rematch(false).await;
        second.answer_rematch(false).await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::Disconnect { .. }
        ));
        assert!(matches!(
            second.recv().await,
            ServerMessage::Disconnect { .. }
        ));
    }

    #[tokio::test]
    async fn session_ends_once_both_seats_exhaust_their_attempts() {
        let addr = spawn_server(&["CRANE"], &["SLATE", "AUDIO"], Duration::from_secs(5)).await;
        let (mut first, mut second) = start_pair(addr).await;

        for attempt in 1..=6u8 {
            first.guess("SLATE").await;
            match first.recv().await {
                ServerMessage::AttemptResult {
                    attempt: seen,
                    finished,
                    game_finished,
                    ..
                } => {
                    assert_eq!(seen, attempt);
                    assert_eq!(finished, attempt == 6);
                    assert!(!game_finished);
                }
                other => panic!("expected attempt_result, got {:?}", other),
            }
            assert!(matches!(
                second.recv().await,
                ServerMessage::OpponentProgress { .. }
            ));
        }

        for attempt in 1..=6u8 {
            second.guess("AUDIO").await;
            match second.recv().await {
                ServerMessage::AttemptResult {
                    attempt: seen,
                    game_finished,
                    winner,
                    ..
                } => {
                    assert_eq!(seen, attempt);
                    assert_eq!(game_finished, attempt == 6);
                    assert_eq!(winner, None);
                }
                other => panic!("expected attempt_result, got {:?}", other),
            }
            assert!(matches!(
                first.recv().await,
                ServerMessage::OpponentProgress { .. }
            ));
        }

        for client in [&mut first, &mut second] {
            match client.recv().await {
                ServerMessage::GameEnd { winner, .. } => assert_eq!(winner, None),
                other => panic!("expected game_end, got {:?}", other),
            }
            assert!(matches!(client.recv().await, ServerMessage::AskNewGame));
        }
    }
}

/// DISCONNECT TESTS
mod disconnect_tests {
    use super::*;

    #[tokio::test]
    async fn disconnect_mid_game_notifies_the_survivor() {
        let addr = spawn_server(&["CRANE"], &[], Duration::from_secs(5)).await;
        let (mut first, second) = start_pair(addr).await;

        drop(second);

        match first.recv().await {
            ServerMessage::GameEnd { winner, reason, .. } => {
                assert_eq!(winner, None);
                assert_eq!(reason.as_deref(), Some("opponent_disconnected"));
            }
            other => panic!("expected game_end, got {:?}", other),
        }
        assert!(matches!(first.recv().await, ServerMessage::AskNewGame));

        first.answer_rematch(false).await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::Disconnect { .. }
        ));
    }
}

/// REMATCH TESTS
mod rematch_tests {
    use super::*;

    async fn win_and_reach_the_question(first: &mut TestClient, second: &mut TestClient) {
        first.guess("CRANE").await;
        assert!(matches!(
            first.recv().await,
            ServerMessage::AttemptResult { won: true, .. }
        ));
        assert!(matches!(
            second.recv().await,
            ServerMessage::OpponentProgress { won: true, .. }
        ));
        for client in [first, second] {
            assert!(matches!(client.recv().await, ServerMessage::GameEnd { .. }));
            assert!(matches!(client.recv().await, ServerMessage::AskNewGame));
        }
    }

    #[tokio::test]
    async fn both_yes_restarts_with_reset_counters() {
        let addr = spawn_server(&["CRANE"], &[], Duration::from_secs(5)).await;
        let (mut first, mut second) = start_pair(addr).await;

        win_and_reach_the_question(&mut first, &mut second).await;

        first.answer_rematch(true).await;
        second.answer_rematch(true).await;

        // A fresh session over the same two connections, same seats.
        expect_game_started(&mut first, 1).await;
        expect_game_started(&mut second, 2).await;

        // Attempt counters start over.
        first.guess("CRANE").await;
        match first.recv().await {
            ServerMessage::AttemptResult {
                attempt,
                won,
                winner,
                ..
            } => {
                assert_eq!(attempt, 1);
                assert!(won);
                assert_eq!(winner, Some(1));
            }
            other => panic!("expected attempt_result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn single_yes_requeues_that_player() {
        let addr = spawn_server(&["CRANE"], &[], Duration::from_secs(5)).await;
        let (mut first, mut second) = start_pair(addr).await;

        win_and_reach_the_question(&mut first, &mut second).await;

        first.answer_rematch(true).await;
        second.answer_rematch(false).await;

        assert!(matches!(first.recv().await, ServerMessage::Waiting));
        assert!(matches!(
            second.recv().await,
            ServerMessage::Disconnect { .. }
        ));

        // A new arrival pairs with the requeued player, who is oldest in
        // the queue and takes seat 1 again.
        let mut third = connect_and_wait(addr).await;
        expect_game_started(&mut first, 1).await;
        expect_game_started(&mut third, 2).await;
    }

    #[tokio::test]
    async fn silence_past_the_deadline_counts_as_no() {
        let addr = spawn_server(&["CRANE"], &[], Duration::from_millis(400)).await;
        let (mut first, mut second) = start_pair(addr).await;

        win_and_reach_the_question(&mut first, &mut second).await;

        // Only seat 1 answers; seat 2 stays silent past the deadline and
        // the yes seat still gets the requeue path.
        first.answer_rematch(true).await;

        assert!(matches!(first.recv().await, ServerMessage::Waiting));
        assert!(matches!(
            second.recv().await,
            ServerMessage::Disconnect { .. }
        ));
    }
}
