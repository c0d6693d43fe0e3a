//! Inbound side of the transport.
//!
//! `ChatListener` binds a TCP socket, accepts connections until stopped
//! and runs one independent decode loop per connection. Every decoded
//! line is handed to the dispatch callback as a [`Payload`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::ChatCodec;
use crate::error::BuddyError;
use crate::payload::Payload;

/// Callback invoked once per decoded inbound line.
pub type LineHandler = Arc<dyn Fn(Payload) + Send + Sync + 'static>;

// ── ChatListener ─────────────────────────────────────────────────

/// Accept loop plus per-connection decode loops.
///
/// # Lifetime
///
/// [`start`](Self::start) is a no-op while running. [`stop`](Self::stop)
/// cancels the accept loop and waits for it to drop the listening socket,
/// so the same port can be bound again right away. Connection loops that
/// are already reading are left to end on EOF or error.
pub struct ChatListener {
    bind_ip: IpAddr,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl ChatListener {
    /// A listener that binds all IPv4 interfaces.
    pub fn new() -> Self {
        Self::with_bind_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn with_bind_ip(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            running: None,
        }
    }

    /// Bind `port` and begin accepting.
    ///
    /// Returns the bound address (useful with port `0`). Calling this
    /// while already running returns the current address and leaves the
    /// existing accept loop and callback untouched.
    pub async fn start<F>(&mut self, port: u16, on_line: F) -> Result<SocketAddr, BuddyError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        if let Some(running) = &self.running {
            if !running.accept_task.is_finished() {
                return Ok(running.local_addr);
            }
        }

        let listener = TcpListener::bind(SocketAddr::new(self.bind_ip, port))
            .await
            .map_err(|source| BuddyError::Bind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BuddyError::Bind { port, source })?;
        info!("chat listener bound on {local_addr}");

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(listener, cancel.clone(), Arc::new(on_line)));

        self.running = Some(Running {
            local_addr,
            cancel,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Cancel the accept loop and close the listening socket.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.accept_task.await {
                warn!("accept loop ended abnormally: {e}");
            }
            info!("chat listener on {} stopped", running.local_addr);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.accept_task.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

impl Default for ChatListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChatListener {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

// ── Loops ────────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, cancel: CancellationToken, on_line: LineHandler) {
    loop {
        let accept = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        match accept {
            Ok((stream, peer)) => {
                debug!("inbound connection from {peer}");
                tokio::spawn(decode_loop(stream, peer, Arc::clone(&on_line)));
            }
            // Transient (e.g. aborted handshake, fd pressure); keep accepting.
            Err(e) => debug!("accept error: {e}"),
        }
    }
    debug!("accept loop exiting");
}

/// Dispatch every line of `stream` until EOF or the first read error.
pub(crate) async fn decode_loop<S>(stream: S, peer: SocketAddr, on_line: LineHandler)
where
    S: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(stream, ChatCodec::new());
    while let Some(result) = lines.next().await {
        match result {
            Ok(payload) => {
                debug!(%peer, %payload, "inbound line");
                on_line(payload);
            }
            Err(e) => {
                debug!(%peer, "closing inbound connection: {e}");
                break;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
