use std::env;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use shared::{encode_frame, ClientMessage, ServerMessage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server address, defaulting to a local server
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:10100".to_string());

    println!("Connecting to {}", addr);
    let stream = TcpStream::connect(&addr).await?;
    println!("Connected from {}", stream.local_addr()?);

    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type a five-letter word to guess, or y/n when asked about a rematch");

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                match line? {
                    None => {
                        println!("Server closed the connection");
                        break;
                    }
                    Some(line) => match serde_json::from_str::<ServerMessage>(&line) {
                        Ok(message) => {
                            if !print_message(&message) {
                                break;
                            }
                        }
                        Err(e) => println!("Unreadable frame {:?}: {}", line, e),
                    },
                }
            }
            line = stdin_lines.next_line() => {
                match line? {
                    None => break,
                    Some(input) => {
                        let input = input.trim();
                        if input.is_empty() {
                            continue;
                        }
                        let message = if input.eq_ignore_ascii_case("y")
                            || input.eq_ignore_ascii_case("n")
                        {
                            ClientMessage::NewGameResponse {
                                answer: input.eq_ignore_ascii_case("y"),
                            }
                        } else {
                            ClientMessage::Attempt {
                                word: input.to_string(),
                            }
                        };
                        write_half.write_all(encode_frame(&message)?.as_bytes()).await?;
                    }
                }
            }
        }
    }

    println!("Test client finished");
    Ok(())
}

/// Prints one server message; returns false once the server says goodbye.
fn print_message(message: &ServerMessage) -> bool {
    match message {
        ServerMessage::Waiting => println!("Waiting for an opponent..."),
        ServerMessage::PlayerId {
            player_id,
            opponent_id,
            ..
        } => println!("You are player {} (opponent: {:?})", player_id, opponent_id),
        ServerMessage::GameStart { opponent_id } => {
            println!("Game started against player {}", opponent_id)
        }
        ServerMessage::AttemptResult {
            word,
            result,
            attempt,
            won,
            game_finished,
            winner,
            ..
        } => {
            println!("Attempt {}: {} -> {:?}", attempt, word, result);
            if *won {
                println!("You guessed it!");
            }
            if *game_finished {
                println!("Game over, winner: {:?}", winner);
            }
        }
        ServerMessage::OpponentProgress {
            opponent_id,
            attempt,
            won,
            finished,
        } => {
            let status = if *won {
                "guessed the word"
            } else if *finished {
                "is out of attempts"
            } else {
                "is still trying"
            };
            println!(
                "Player {} used attempt {} and {}",
                opponent_id, attempt, status
            );
        }
        ServerMessage::InvalidWord { word, reason } => {
            println!("Invalid word {:?}: {:?}", word, reason)
        }
        ServerMessage::GameEnd {
            target_word,
            winner,
            reason,
            players,
        } => {
            println!("The word was {}", target_word);
            println!("Winner: {:?} (reason: {:?})", winner, reason);
            for player in players {
                println!(
                    "  Player {}: {} attempts, won: {}",
                    player.id, player.attempts, player.won
                );
            }
        }
        ServerMessage::AskNewGame => println!("Play again? (y/n)"),
        ServerMessage::Disconnect { message } => {
            println!("Server says: {}", message);
            return false;
        }
    }
    true
}
