//! Socket session to the flicd daemon
//!
//! One session exists per adapter instance and is shared by every
//! button. The transport is line-oriented: the writer task serializes
//! [`ClientCommand`]s, the reader task parses daemon lines into
//! [`FlicEvent`]s and forwards them to the adapter event loop.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use flic_core::events::FlicEvent;
use flic_core::prelude::*;

use crate::protocol::{next_request_id, parse_client_line, ClientCommand};

/// Events delivered to the adapter loop by the session
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A typed daemon event
    Event(FlicEvent),
    /// The transport failed or was closed; all button operations are
    /// suspended until a fresh session is established
    TransportClosed { reason: String },
}

/// Cloneable handle for sending commands over the session.
///
/// Sends are fire-and-forget; the daemon answers via the event stream.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<ClientCommand>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("cmd_tx", &"<channel>")
            .finish()
    }
}

impl SessionHandle {
    pub fn new(cmd_tx: mpsc::Sender<ClientCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Queue a command for the writer task
    pub async fn send(&self, command: ClientCommand) -> Result<()> {
        debug!("Sending command: {}", command.description());
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| Error::channel_send("daemon session closed"))
    }
}

/// Owns the socket connection to the flicd daemon.
///
/// Dropping the client (or calling [`close`](FlicClient::close)) ends
/// the writer task, which closes the socket and in turn terminates the
/// reader task.
pub struct FlicClient {
    cmd_tx: mpsc::Sender<ClientCommand>,
}

impl FlicClient {
    /// Connect to the daemon and start the session tasks.
    ///
    /// Returning `Ok` is the session readiness signal. A refused
    /// connection is reported as [`Error::DaemonUnreachable`] (no daemon
    /// at all); any other connect failure as [`Error::SessionRejected`]
    /// (daemon present but the session could not be established) for
    /// operator messaging.
    pub async fn connect(
        host: &str,
        port: u16,
        event_tx: mpsc::Sender<ClientEvent>,
    ) -> Result<Self> {
        info!("Connecting to flicd at {}:{}", host, port);

        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                Error::DaemonUnreachable {
                    host: host.to_string(),
                    port,
                }
            } else {
                Error::session_rejected(e.to_string())
            }
        })?;

        let (read_half, write_half) = stream.into_split();

        let (cmd_tx, cmd_rx) = mpsc::channel::<ClientCommand>(32);
        tokio::spawn(Self::writer(write_half, cmd_rx));
        tokio::spawn(Self::reader(read_half, event_tx));

        info!("flicd session established");
        Ok(Self { cmd_tx })
    }

    /// Get a cloneable handle for sending commands
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.cmd_tx.clone())
    }

    /// Close the session.
    ///
    /// Consumes the client; once every outstanding [`SessionHandle`] is
    /// dropped the writer task ends and the socket closes.
    pub fn close(self) {
        info!("Closing flicd session");
    }

    /// Read daemon lines and forward typed events to the adapter loop
    async fn reader(read_half: OwnedReadHalf, tx: mpsc::Sender<ClientEvent>) {
        let mut reader = BufReader::new(read_half).lines();

        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    trace!("flicd: {}", line);
                    let Some(event) = parse_client_line(&line) else {
                        warn!("Unparseable line from flicd: {}", line);
                        continue;
                    };
                    if tx.send(ClientEvent::Event(event)).await.is_err() {
                        debug!("event channel closed");
                        return;
                    }
                }
                Ok(None) => {
                    info!("flicd closed the session");
                    let _ = tx
                        .send(ClientEvent::TransportClosed {
                            reason: "daemon closed the connection".to_string(),
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    error!("flicd session read error: {}", e);
                    let _ = tx
                        .send(ClientEvent::TransportClosed {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }
    }

    /// Serialize queued commands onto the socket
    async fn writer(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<ClientCommand>) {
        while let Some(command) = rx.recv().await {
            let line = command.build(next_request_id());
            trace!("to flicd: {}", line);

            if let Err(e) = write_half.write_all(line.as_bytes()).await {
                error!("Failed to write to flicd session: {}", e);
                break;
            }
            if let Err(e) = write_half.write_all(b"\n").await {
                error!("Failed to write newline: {}", e);
                break;
            }
            if let Err(e) = write_half.flush().await {
                error!("Failed to flush flicd session: {}", e);
                break;
            }
        }

        debug!("session writer finished");
        let _ = write_half.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flic_core::types::BdAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Bind a loopback listener standing in for flicd
    async fn fake_daemon() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_connect_refused_is_unreachable() {
        let (event_tx, _event_rx) = mpsc::channel(16);
        // Port 1 is essentially never listening
        let result = FlicClient::connect("127.0.0.1", 1, event_tx).await;
        assert!(matches!(result, Err(Error::DaemonUnreachable { .. })));
    }

    #[tokio::test]
    async fn test_commands_are_written_as_json_lines() {
        let (listener, port) = fake_daemon().await;
        let (event_tx, _event_rx) = mpsc::channel(16);

        let client = FlicClient::connect("127.0.0.1", port, event_tx).await.unwrap();
        let handle = client.handle();

        let (mut socket, _) = listener.accept().await.unwrap();

        handle
            .send(ClientCommand::CreateConnectionChannel {
                conn_id: 1,
                bd_addr: BdAddr::from("aa:bb:cc:dd:ee:ff"),
            })
            .await
            .unwrap();

        let mut received = Vec::new();
        let mut buf = vec![0u8; 1024];
        while !received.ends_with(b"\n") {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "socket closed before a full line arrived");
            received.extend_from_slice(&buf[..n]);
        }
        let line = String::from_utf8_lossy(&received);

        assert!(line.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["method"], "createConnectionChannel");
        assert_eq!(parsed["params"]["bdAddr"], "aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn test_daemon_lines_become_typed_events() {
        let (listener, port) = fake_daemon().await;
        let (event_tx, mut event_rx) = mpsc::channel(16);

        let _client = FlicClient::connect("127.0.0.1", port, event_tx).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();

        socket
            .write_all(
                b"{\"event\":\"batteryStatus\",\"params\":{\"listenerId\":2,\"batteryPercentage\":55}}\n",
            )
            .await
            .unwrap();

        match event_rx.recv().await {
            Some(ClientEvent::Event(FlicEvent::BatteryStatus(b))) => {
                assert_eq!(b.listener_id, 2);
                assert_eq!(b.battery_percentage, 55);
            }
            other => panic!("expected BatteryStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_daemon_disconnect_emits_transport_closed() {
        let (listener, port) = fake_daemon().await;
        let (event_tx, mut event_rx) = mpsc::channel(16);

        let _client = FlicClient::connect("127.0.0.1", port, event_tx).await.unwrap();
        let (socket, _) = listener.accept().await.unwrap();

        drop(socket);

        match event_rx.recv().await {
            Some(ClientEvent::TransportClosed { .. }) => {}
            other => panic!("expected TransportClosed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_lines_are_skipped() {
        let (listener, port) = fake_daemon().await;
        let (event_tx, mut event_rx) = mpsc::channel(16);

        let _client = FlicClient::connect("127.0.0.1", port, event_tx).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();

        socket.write_all(b"garbage line\n").await.unwrap();
        socket
            .write_all(b"{\"event\":\"getInfoResponse\",\"params\":{\"bdAddrOfVerifiedButtons\":[]}}\n")
            .await
            .unwrap();

        // The garbage line is dropped; the next valid event still arrives
        match event_rx.recv().await {
            Some(ClientEvent::Event(FlicEvent::GetInfoResponse(_))) => {}
            other => panic!("expected GetInfoResponse, got {:?}", other),
        }
    }
}
