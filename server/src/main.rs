use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

use server::listener;
use server::lobby::Lobby;
use server::session::SessionConfig;
use server::words::WordList;

/// Main-method of the application.
/// Parses command-line arguments, loads the word list, then runs the
/// lobby task and the accept loop until ctrl-c.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "10100")]
        port: u16,
        /// File with the playable five-letter words, one per line
        #[clap(long, default_value = "data/pr.txt")]
        words: PathBuf,
        /// File with extra words accepted as guesses (missing is fine)
        #[clap(long, default_value = "data/sedout.txt")]
        extra_words: PathBuf,
        /// Seconds both players get to answer the rematch question
        #[clap(long, default_value = "30")]
        rematch_timeout_secs: u64,
        /// Seconds of inbound silence before a connection's health is
        /// re-checked
        #[clap(long, default_value = "60")]
        liveness_timeout_secs: u64,
    }

    // Parse command line arguments
    let args = Args::parse();

    env_logger::init();

    let words = match WordList::load(&args.words, &args.extra_words) {
        Ok(words) => words,
        Err(e) => {
            warn!(
                "could not load {}: {}; falling back to the built-in word list",
                args.words.display(),
                e
            );
            WordList::fallback()
        }
    };
    info!(
        "loaded {} playable words, {} valid guesses",
        words.playable_count(),
        words.valid_count()
    );

    let config = SessionConfig {
        rematch_timeout: Duration::from_secs(args.rematch_timeout_secs),
    };
    let (handle, lobby) = Lobby::new(Arc::new(words), config);

    // Spawn the lobby task
    let lobby_handle = tokio::spawn(lobby.run());

    // Spawn the accept loop
    let address = format!("{}:{}", args.host, args.port);
    let liveness_timeout = Duration::from_secs(args.liveness_timeout_secs);
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener::run(&address, handle, liveness_timeout).await {
            eprintln!("Failed to start server: {}", e);
        }
    });

    // Handle shutdown gracefully
    tokio::select! {
        result = listener_handle => {
            if let Err(e) = result {
                eprintln!("Listener task panicked: {}", e);
            }
        }
        result = lobby_handle => {
            if let Err(e) = result {
                eprintln!("Lobby task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
