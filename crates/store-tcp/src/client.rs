use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use foehn_store::{RendezvousStore, StoreError, is_valid_key};
use foehn_store_memory::MemoryStore;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use crate::protocol::{self, Request, Response};
use crate::{Error, StoreServer, TcpStoreConfig};

// Caps deadlines so `Instant` arithmetic never overflows.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

// Slack for a wait reply sent by the server right at the deadline.
const REPLY_GRACE: Duration = Duration::from_millis(250);

/// Client side of the TCP rendezvous store.
///
/// Every rank holds one; clones share a single connection for `set`, `get`,
/// `add` and `check`, while each `wait` runs on its own connection so a
/// blocked wait never stalls other callers.
#[derive(Clone, Debug)]
pub struct TcpStore {
    config: TcpStoreConfig,
    connection: Arc<Mutex<Option<TcpStream>>>,
    server: Option<Arc<StoreServer>>,
}

impl TcpStore {
    /// Creates a client without connecting. The first operation connects.
    #[must_use]
    pub fn new(config: TcpStoreConfig) -> Self {
        Self {
            config,
            connection: Arc::new(Mutex::new(None)),
            server: None,
        }
    }

    /// Creates a client and connects, retrying until `default_timeout` passes.
    ///
    /// Peers usually start before the hosting rank is listening, so refused
    /// connections and unanswered pings are retried with backoff.
    pub async fn connect(config: TcpStoreConfig) -> Result<Self, Error> {
        let store = Self::new(config);
        let deadline = deadline_after(store.config.default_timeout);

        let stream = store.open_with_retry(deadline).await?;
        *store.connection.lock().await = Some(stream);

        info!("connected to store server at {}", store.config.addr);
        Ok(store)
    }

    /// Starts a `StoreServer` on `config.addr` and connects to it.
    ///
    /// The server lives as long as this store (and its clones) or until
    /// [`TcpStore::shutdown`].
    pub async fn host(config: TcpStoreConfig) -> Result<Self, Error> {
        let store = MemoryStore::new().with_default_timeout(config.default_timeout);
        let server = StoreServer::start(config.addr, store).await?;

        let config = TcpStoreConfig {
            addr: server.local_addr(),
            ..config
        };
        let mut client = match Self::connect(config).await {
            Ok(client) => client,
            Err(e) => {
                server.shutdown().await;
                return Err(e);
            }
        };
        client.server = Some(Arc::new(server));

        Ok(client)
    }

    /// The server address this client talks to.
    #[must_use]
    pub const fn server_addr(&self) -> std::net::SocketAddr {
        self.config.addr
    }

    /// Whether this client hosts the server.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        self.server.is_some()
    }

    /// Closes the shared connection and stops the hosted server, if any.
    pub async fn shutdown(&self) {
        self.connection.lock().await.take();

        if let Some(server) = &self.server {
            server.shutdown().await;
        }
    }

    async fn open_once(&self, deadline: Instant) -> Result<TcpStream, Error> {
        let addr = self.config.addr;
        let stream = timeout_at(deadline, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectTimeout(addr))?
            .map_err(|e| Error::Io("error connecting to store server", e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Io("error configuring connection", e))?;

        debug!("opened connection to {}", addr);
        Ok(stream)
    }

    async fn open_with_retry(&self, deadline: Instant) -> Result<TcpStream, Error> {
        let mut attempts = 0;
        let mut delay = self.config.retry_base_delay;

        loop {
            attempts += 1;

            match self.open_checked(deadline).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(attempts, error = %e, "giving up connecting to store server");
                        return Err(Error::ConnectTimeout(self.config.addr));
                    }

                    debug!(attempt = attempts, delay = ?delay, error = %e, "connect failed, retrying");
                    sleep_until((now + jittered(delay)).min(deadline)).await;
                    delay = (delay * 2).min(self.config.retry_max_delay);
                }
            }
        }
    }

    /// Opens a connection and checks the server answers a ping by `deadline`.
    async fn open_checked(&self, deadline: Instant) -> Result<TcpStream, Error> {
        let mut stream = self.open_once(deadline).await?;

        let response = timeout_at(deadline, Self::round_trip(&mut stream, &Request::Ping))
            .await
            .map_err(|_| {
                Error::Io(
                    "error awaiting ping response",
                    std::io::ErrorKind::TimedOut.into(),
                )
            })??;

        match response {
            Response::Pong => Ok(stream),
            _ => Err(Error::UnexpectedResponse("ping")),
        }
    }

    async fn round_trip(stream: &mut TcpStream, request: &Request) -> Result<Response, Error> {
        protocol::write_frame(stream, &protocol::encode(request)?).await?;

        let frame = protocol::read_frame(stream).await?.ok_or_else(|| {
            Error::Io(
                "error reading response",
                std::io::ErrorKind::UnexpectedEof.into(),
            )
        })?;

        protocol::decode(&frame)
    }

    /// Sends a non-blocking request on the shared connection.
    ///
    /// Transport failures are returned immediately; the connection is dropped
    /// and the next call reconnects.
    async fn call(&self, request: &Request) -> Result<Response, Error> {
        let deadline = deadline_after(self.config.operation_timeout);
        let mut connection = self.connection.lock().await;

        // A failed exchange leaves the slot empty so the next call reconnects.
        let mut stream = match connection.take() {
            Some(stream) => stream,
            None => self.open_once(deadline).await?,
        };

        let response = timeout_at(deadline, Self::round_trip(&mut stream, request))
            .await
            .map_err(|_| {
                Error::Io(
                    "error awaiting response",
                    std::io::ErrorKind::TimedOut.into(),
                )
            })??;
        *connection = Some(stream);

        match response {
            Response::Error { kind, message } => {
                Err(Error::from_remote(kind, message, request.key()))
            }
            response => Ok(response),
        }
    }

    async fn wait_once(
        &self,
        keys: &[String],
        deadline: Instant,
        timeout: Duration,
    ) -> Result<(), Error> {
        // A zero-timeout wait still gets one operation timeout to reach the
        // server once; any other wait keeps all I/O inside its own budget.
        let io_deadline = if timeout.is_zero() {
            deadline_after(self.config.operation_timeout)
        } else {
            deadline
        };
        let mut stream = self.open_once(io_deadline).await?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let request = Request::Wait {
            keys: keys.to_vec(),
            timeout_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
        };

        let reply_deadline = io_deadline + REPLY_GRACE;
        let response = timeout_at(reply_deadline, Self::round_trip(&mut stream, &request))
            .await
            .map_err(|_| {
                Error::Io(
                    "error awaiting wait response",
                    std::io::ErrorKind::TimedOut.into(),
                )
            })??;

        match response {
            Response::Ok => Ok(()),
            Response::TimedOut { missing } => Err(Error::WaitTimeout { missing, timeout }),
            Response::Error { kind, message } => Err(Error::from_remote(kind, message, None)),
            _ => Err(Error::UnexpectedResponse("wait")),
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(MAX_WAIT)
}

fn jittered(delay: Duration) -> Duration {
    let max_jitter = u64::try_from(delay.as_millis() / 4).unwrap_or(u64::MAX);
    delay + Duration::from_millis(fastrand::u64(0..=max_jitter))
}

fn validate_keys<K: AsRef<str>>(keys: &[K]) -> Result<Vec<String>, Error> {
    keys.iter()
        .map(|key| {
            let key = key.as_ref();
            if is_valid_key(key) {
                Ok(key.to_string())
            } else {
                Err(Error::InvalidKey)
            }
        })
        .collect()
}

#[async_trait]
impl RendezvousStore for TcpStore {
    type Error = Error;

    async fn set<K: Into<String> + Send>(&self, key: K, value: Bytes) -> Result<(), Self::Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidKey);
        }

        match self.call(&Request::Set { key, value }).await? {
            Response::Ok => Ok(()),
            _ => Err(Error::UnexpectedResponse("set")),
        }
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Bytes, Self::Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidKey);
        }

        match self.call(&Request::Get { key }).await? {
            Response::Value(value) => Ok(value),
            _ => Err(Error::UnexpectedResponse("get")),
        }
    }

    async fn add<K: Into<String> + Send>(&self, key: K, amount: i64) -> Result<i64, Self::Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidKey);
        }

        match self.call(&Request::Add { key, amount }).await? {
            Response::Counter(total) => Ok(total),
            _ => Err(Error::UnexpectedResponse("add")),
        }
    }

    async fn check<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<bool, Self::Error> {
        let keys = validate_keys(keys)?;

        match self.call(&Request::Check { keys }).await? {
            Response::Ready(ready) => Ok(ready),
            _ => Err(Error::UnexpectedResponse("check")),
        }
    }

    async fn wait<K: AsRef<str> + Sync>(
        &self,
        keys: &[K],
        timeout: Option<Duration>,
    ) -> Result<(), Self::Error> {
        let keys = validate_keys(keys)?;
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let deadline = deadline_after(timeout);

        let mut attempts = 0;
        let mut delay = self.config.retry_base_delay;

        loop {
            attempts += 1;

            match self.wait_once(&keys, deadline, timeout).await {
                Err(e) if e.kind().is_transient() => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(attempts, error = %e, "wait budget exhausted by transport errors");
                        return Err(Error::WaitTimeout {
                            missing: keys,
                            timeout,
                        });
                    }

                    warn!(
                        attempt = attempts,
                        delay = ?delay,
                        error = %e,
                        "wait failed, retrying"
                    );
                    sleep_until((now + jittered(delay)).min(deadline)).await;
                    delay = (delay * 2).min(self.config.retry_max_delay);
                }
                result => {
                    if attempts > 1 && result.is_ok() {
                        debug!(attempts, "wait succeeded after retry");
                    }
                    return result;
                }
            }
        }
    }

    fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }
}
