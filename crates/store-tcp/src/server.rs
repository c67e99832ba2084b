use std::net::SocketAddr;
use std::time::Duration;

use foehn_store::{RendezvousStore, StoreError, StoreErrorKind};
use foehn_store_memory::{Error as MemoryError, MemoryStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::protocol::{self, Request, Response};

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before the next `accept` after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

/// Hosts the group's shared key space and serves it to `TcpStore` clients.
///
/// One process per group (rank 0) runs the server. Waits are parked on the
/// server and answered as soon as the keys arrive, so clients never poll.
#[derive(Debug)]
pub struct StoreServer {
    local_addr: SocketAddr,
    store: MemoryStore,
    shutdown_tx: broadcast::Sender<()>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StoreServer {
    /// Binds `addr` and starts accepting connections.
    ///
    /// Binding port 0 picks a free port; see [`StoreServer::local_addr`].
    pub async fn start(addr: SocketAddr, store: MemoryStore) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io("error binding store server", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Io("error reading local address", e))?;
        info!("store server listening on {}", local_addr);

        let (shutdown_tx, _) = broadcast::channel(1);

        let accept_store = store.clone();
        let accept_shutdown_tx = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut failures: u32 = 0;

            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                failures = 0;
                                debug!("accepted connection from {}", addr);
                                let store = accept_store.clone();
                                let shutdown_rx = accept_shutdown_tx.subscribe();

                                tokio::spawn(async move {
                                    if let Err(e) = Self::handle_connection(stream, store, shutdown_rx).await {
                                        warn!("connection from {} failed: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                // Errors such as fd exhaustion persist; don't spin on them.
                                failures = failures.saturating_add(1);
                                let delay = accept_backoff(failures);
                                error!(failures, delay = ?delay, "failed to accept connection: {}", e);
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("store server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            store,
            shutdown_tx,
            listener_handle: Mutex::new(Some(handle)),
        })
    }

    /// The address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The key space served by this server.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Stops accepting connections and drops every open connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.listener_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        store: MemoryStore,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), Error> {
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Io("error configuring connection", e))?;

        loop {
            tokio::select! {
                served = Self::serve_next(&mut stream, &store) => {
                    if !served? {
                        return Ok(());
                    }
                }
                _ = shutdown_rx.recv() => return Ok(()),
            }
        }
    }

    /// Serves one request. Returns `false` once the client has hung up.
    async fn serve_next(stream: &mut TcpStream, store: &MemoryStore) -> Result<bool, Error> {
        let Some(frame) = protocol::read_frame(stream).await? else {
            return Ok(false);
        };

        let response = match protocol::decode::<Request>(&frame) {
            Ok(request) => {
                debug!(request = request.name(), key = ?request.key(), "serving request");
                Self::dispatch(store, request).await
            }
            Err(e) => Response::Error {
                kind: StoreErrorKind::Transport,
                message: e.to_string(),
            },
        };

        protocol::write_frame(stream, &protocol::encode(&response)?).await?;
        Ok(true)
    }

    async fn dispatch(store: &MemoryStore, request: Request) -> Response {
        let result = match request {
            Request::Add { key, amount } => store.add(key, amount).await.map(Response::Counter),
            Request::Check { keys } => store.check(keys.as_slice()).await.map(Response::Ready),
            Request::Get { key } => store.get(key).await.map(Response::Value),
            Request::Ping => Ok(Response::Pong),
            Request::Set { key, value } => store.set(key, value).await.map(|()| Response::Ok),
            Request::Wait { keys, timeout_ms } => store
                .wait(keys.as_slice(), Some(Duration::from_millis(timeout_ms)))
                .await
                .map(|()| Response::Ok),
        };

        result.unwrap_or_else(|e| match e {
            MemoryError::WaitTimeout { missing, .. } => Response::TimedOut { missing },
            e => Response::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        })
    }
}

impl Drop for StoreServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(8), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }
}
