//! TCP accept loop feeding the lobby.

use log::{error, info};
use tokio::net::TcpListener;
use tokio::time::Duration;

use shared::ServerMessage;

use crate::connection::Connection;
use crate::lobby::LobbyHandle;

/// Binds `addr` and serves it until the process ends.
pub async fn run(
    addr: &str,
    lobby: LobbyHandle,
    liveness_timeout: Duration,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    serve(listener, lobby, liveness_timeout).await
}

/// Accept loop over an already-bound listener. Every accepted stream
/// becomes a connection that gets the initial waiting notice and then
/// joins the matchmaking queue; accept failures are logged and the loop
/// keeps going.
pub async fn serve(
    listener: TcpListener,
    lobby: LobbyHandle,
    liveness_timeout: Duration,
) -> std::io::Result<()> {
    let mut next_connection_id: u64 = 0;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                next_connection_id += 1;
                let connection = Connection::spawn(stream, next_connection_id, liveness_timeout);
                info!("connection {} accepted from {}", connection.id(), peer);

                if connection.send(&ServerMessage::Waiting).is_err() {
                    // Gone before the greeting was even queued.
                    continue;
                }
                lobby.register(connection);
            }
            Err(e) => error!("failed to accept a connection: {}", e),
        }
    }
}
