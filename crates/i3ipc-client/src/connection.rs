//! The connection facade
//!
//! A [`Connection`] owns one socket to i3. Requests from any number of tasks
//! share it with the event stream: writes are serialized, and a single read
//! loop ([`Connection::run`]) routes every inbound frame either to the caller
//! waiting for that reply or to the event dispatcher.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::codec::Frame;
use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::error::IpcError;
use crate::events::EventDispatcher;
use crate::message::{EventKind, MessageKind, ReplyKind};
use crate::transport::{FrameReader, FrameWriter};
use crate::types::{BarConfig, Output, SuccessReplies, SuccessReply, TreeNode, Version, Workspace};

/// Default number of connection retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial delay between retry attempts
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Maximum delay between retry attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long `close` waits for buffered bytes to drain before giving up
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Find the i3 socket
///
/// Uses `config.socket_path` when set. Otherwise runs
/// `<wm_binary> --get-socketpath` and takes its trimmed output.
///
/// # Errors
///
/// Returns `IpcError::DiscoverySpawn` if the binary cannot be run.
/// Returns `IpcError::DiscoveryFailed` if it exits unsuccessfully.
/// Returns `IpcError::EmptySocketPath` if it prints nothing.
pub async fn discover_socket_path(config: &ClientConfig) -> Result<PathBuf, IpcError> {
    if let Some(path) = &config.socket_path {
        debug!(path = %path.display(), "Using configured i3 socket path");
        return Ok(path.clone());
    }

    let binary = &config.wm_binary;
    let output = Command::new(binary)
        .arg("--get-socketpath")
        .output()
        .await
        .map_err(|source| IpcError::DiscoverySpawn {
            binary: binary.clone(),
            source,
        })?;

    if !output.status.success() {
        debug!(
            binary = %binary,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Socket discovery failed"
        );
        return Err(IpcError::DiscoveryFailed {
            binary: binary.clone(),
            status: output.status,
        });
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        return Err(IpcError::EmptySocketPath {
            binary: binary.clone(),
        });
    }

    debug!(path = %path, "Discovered i3 socket path");
    Ok(PathBuf::from(path))
}

struct Inner {
    /// Held while registering *and* writing, so per-kind FIFO order is wire order
    writer: Mutex<FrameWriter<BoxedWriter>>,
    /// Taken by the read loop; `None` once it has started
    reader: StdMutex<Option<FrameReader<BoxedReader>>>,
    correlator: Correlator,
    dispatcher: EventDispatcher,
    shutdown: watch::Sender<bool>,
    config: ClientConfig,
}

/// A connection to i3
///
/// Cloning is cheap; all clones share the same socket. Nothing is read until
/// [`Connection::run`] (or [`Connection::spawn`]) is driving the read loop, so
/// requests made without it never complete.
///
/// # Example
///
/// ```ignore
/// let conn = Connection::attach().await?;
/// let reader = conn.spawn();
///
/// for ws in conn.workspaces().await? {
///     println!("{} on {}", ws.name, ws.output);
/// }
///
/// conn.close().await;
/// reader.await??;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Discover the running i3's socket and connect to it
    ///
    /// `$I3SOCK` is honoured when set; otherwise `i3 --get-socketpath` is asked.
    ///
    /// # Errors
    ///
    /// Returns the discovery errors of [`discover_socket_path`].
    /// Returns `IpcError::ConnectionFailed` if the socket cannot be opened.
    pub async fn attach() -> Result<Self, IpcError> {
        Self::attach_with(ClientConfig::from_env()).await
    }

    /// Like [`Connection::attach`], with explicit configuration
    pub async fn attach_with(config: ClientConfig) -> Result<Self, IpcError> {
        let path = discover_socket_path(&config).await?;
        Self::connect_with(path, config).await
    }

    /// Connect to the i3 socket at `path`
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionFailed` if the socket cannot be opened.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        Self::connect_with(path, ClientConfig::default()).await
    }

    pub async fn connect_with(path: impl AsRef<Path>, config: ClientConfig) -> Result<Self, IpcError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| IpcError::ConnectionFailed {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = %path.display(), "Connected to i3");
        let (reader, writer) = stream.into_split();
        Ok(Self::from_halves(Box::new(reader), Box::new(writer), config))
    }

    /// Connect with retry logic and exponential backoff
    ///
    /// Useful while i3 is still starting: only a socket that does not exist
    /// yet or refuses connections is retried. Any other failure is returned
    /// straight away. A connection that later closes is not reopened.
    ///
    /// # Backoff Strategy
    ///
    /// - Initial delay: 100ms
    /// - Each retry: delay *= 2
    /// - Maximum delay: 1 second (capped)
    ///
    /// # Errors
    ///
    /// Returns `IpcError::MaxRetriesExceeded` if every attempt found no socket.
    /// Returns `IpcError::ConnectionFailed` for any other connect error.
    pub async fn connect_with_retry(
        path: impl AsRef<Path>,
        config: ClientConfig,
        max_retries: u32,
    ) -> Result<Self, IpcError> {
        let path = path.as_ref();
        let mut attempts = 0;
        let mut delay = INITIAL_RETRY_DELAY;

        loop {
            attempts += 1;

            let source = match Self::connect_with(path, config.clone()).await {
                Ok(conn) => return Ok(conn),
                Err(IpcError::ConnectionFailed { source, .. }) if socket_not_ready(&source) => {
                    source
                }
                Err(err) => return Err(err),
            };

            if attempts > max_retries {
                warn!(
                    path = %path.display(),
                    attempts,
                    error = %source,
                    "Failed to connect to i3 after all retry attempts"
                );
                return Err(IpcError::MaxRetriesExceeded {
                    path: path.to_path_buf(),
                    attempts,
                    source,
                });
            }

            debug!(
                attempt = attempts,
                max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %source,
                "i3 socket not ready, retrying"
            );
            sleep(delay).await;
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }
    }

    /// [`Connection::connect_with_retry`] with the default of 3 retries
    pub async fn connect_with_default_retry(
        path: impl AsRef<Path>,
        config: ClientConfig,
    ) -> Result<Self, IpcError> {
        Self::connect_with_retry(path, config, DEFAULT_MAX_RETRIES).await
    }

    /// Use an already open duplex stream as the connection
    pub fn with_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_stream_config(stream, ClientConfig::default())
    }

    pub fn with_stream_config<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_halves(Box::new(reader), Box::new(writer), config)
    }

    fn from_halves(reader: BoxedReader, writer: BoxedWriter, config: ClientConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let reader = FrameReader::new(reader, config.max_payload, config.read_chunk_size);

        Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(FrameWriter::new(writer)),
                reader: StdMutex::new(Some(reader)),
                correlator: Correlator::new(),
                dispatcher: EventDispatcher::new(),
                shutdown,
                config,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Callback registry for events on this connection
    ///
    /// Callbacks only fire for event kinds passed to [`Connection::subscribe`].
    pub fn events(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn is_closed(&self) -> bool {
        self.inner.correlator.is_closed()
    }

    /// Drive the read loop until the connection closes
    ///
    /// Returns `Ok(())` when the peer hangs up or [`Connection::close`] is
    /// called. Either way every pending request fails with
    /// `IpcError::ConnectionClosed`.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::AlreadyRunning` if the loop was already started.
    /// Returns `IpcError::ReceiveFailed` or `IpcError::Framing` when the
    /// stream breaks; the connection is closed in that case.
    pub async fn run(&self) -> Result<(), IpcError> {
        let mut reader = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(IpcError::AlreadyRunning)?;

        let mut shutdown = self.inner.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        debug!("Read loop started");
        loop {
            let frame = tokio::select! {
                frame = reader.next_frame() => frame,
                _ = shutdown.changed() => {
                    debug!("Read loop stopped by close");
                    return Ok(());
                }
            };

            match frame {
                Ok(frame) => self.route(frame),
                Err(IpcError::ConnectionClosed) => {
                    info!("i3 closed the connection");
                    self.teardown();
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "Read loop failed, closing connection");
                    self.teardown();
                    return Err(err);
                }
            }
        }
    }

    /// Run the read loop on a new tokio task
    pub fn spawn(&self) -> JoinHandle<Result<(), IpcError>> {
        let conn = self.clone();
        tokio::spawn(async move { conn.run().await })
    }

    /// Close the connection
    ///
    /// Pending requests fail with `IpcError::ConnectionClosed`, the read loop
    /// returns, and later requests fail immediately. Calling again is a no-op.
    ///
    /// Never waits on a write stuck behind a full socket. The writer is shut
    /// down only if it is idle; a busy writer abandons its write on its own.
    pub async fn close(&self) {
        self.teardown();

        let Ok(mut writer) = self.inner.writer.try_lock() else {
            debug!("Writer busy, skipping socket shutdown");
            return;
        };
        match timeout(CLOSE_FLUSH_TIMEOUT, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "Socket shutdown failed"),
            Err(_) => debug!("Socket shutdown timed out"),
        }
    }

    fn teardown(&self) {
        self.inner.shutdown.send_replace(true);
        let failed = self.inner.correlator.close();
        if failed > 0 {
            warn!(failed, "Connection closed with requests pending");
        }
    }

    fn route(&self, frame: Frame) {
        let code = frame.code();

        if frame.is_event() {
            let Some(kind) = EventKind::from_code(code) else {
                let err = IpcError::UnknownEvent { code };
                warn!(error = %err, "Dropping event frame");
                return;
            };
            if let Err(err) = self.inner.dispatcher.dispatch(kind, &frame.payload) {
                warn!(kind = %kind, error = %err, "Dropping event");
            }
            return;
        }

        match ReplyKind::from_code(code) {
            Some(kind) => {
                self.inner.correlator.resolve(kind, Ok(frame.payload));
            }
            None => {
                let err = IpcError::UnexpectedReply {
                    message_type: frame.message_type,
                };
                warn!(error = %err, "Dropping reply frame");
            }
        }
    }

    /// Send a raw request and wait for the raw reply payload
    ///
    /// Dropping the returned future is safe at any point. A request whose
    /// frame was never queued gives up its place in line; one whose frame was
    /// queued keeps it, and its reply is discarded when it arrives.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` if the connection is or becomes
    /// closed before the reply arrives.
    /// Returns `IpcError::SendFailed` if the write fails; the connection is
    /// closed in that case.
    pub async fn request(&self, kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>, IpcError> {
        let reply_kind = kind.reply_kind();
        let mut shutdown = self.inner.shutdown.subscribe();

        let pending = {
            let mut writer = self.inner.writer.lock().await;
            let pending = self.inner.correlator.register(reply_kind)?;
            let mut unsent = Unsent::new(&self.inner.correlator, reply_kind);

            let queued = tokio::select! {
                result = writer.queue(kind, payload) => result,
                _ = shutdown.changed() => Err(IpcError::ConnectionClosed),
            };
            queued.map_err(|err| self.send_failed(kind, err))?;
            unsent.disarm();

            let flushed = tokio::select! {
                result = writer.flush() => result,
                _ = shutdown.changed() => Err(IpcError::ConnectionClosed),
            };
            flushed.map_err(|err| self.send_failed(kind, err))?;
            pending
        };

        debug!(
            kind = %kind,
            len = payload.len(),
            waiting = self.inner.correlator.pending(reply_kind),
            "Request sent, awaiting reply"
        );
        pending.wait().await
    }

    fn send_failed(&self, kind: MessageKind, err: IpcError) -> IpcError {
        if !matches!(err, IpcError::ConnectionClosed) {
            warn!(kind = %kind, error = %err, "Failed to send request, closing connection");
        }
        self.teardown();
        err
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<T, IpcError> {
        let reply = self.request(kind, payload).await?;
        serde_json::from_slice(&reply).map_err(|source| IpcError::DeserializeFailed {
            kind: kind.reply_kind(),
            source,
        })
    }

    /// Run i3 commands and return the outcome of each
    ///
    /// i3 accepts several commands separated by `;` or `,` and reports on
    /// each one.
    pub async fn command_results(&self, command: &str) -> Result<Vec<SuccessReply>, IpcError> {
        let replies: SuccessReplies = self
            .request_json(MessageKind::Command, command.as_bytes())
            .await?;
        Ok(replies.into_vec())
    }

    /// Run an i3 command; `true` if i3 reports success for it
    ///
    /// # Errors
    ///
    /// Returns `IpcError::EmptyReply` if i3 answers with an empty list.
    ///
    /// # Example
    ///
    /// ```ignore
    /// assert!(conn.command("workspace 2").await?);
    /// ```
    pub async fn command(&self, command: &str) -> Result<bool, IpcError> {
        let replies = self.command_results(command).await?;
        first_success(ReplyKind::Command, &replies)
    }

    /// Ask i3 to send events of the given kinds on this connection
    pub async fn subscribe(&self, events: &[EventKind]) -> Result<bool, IpcError> {
        let payload = serde_json::to_vec(events).map_err(IpcError::SerializeFailed)?;
        let replies: SuccessReplies = self.request_json(MessageKind::Subscribe, &payload).await?;
        first_success(ReplyKind::Subscribe, &replies.into_vec())
    }

    pub async fn workspaces(&self) -> Result<Vec<Workspace>, IpcError> {
        self.request_json(MessageKind::GetWorkspaces, &[]).await
    }

    /// Workspaces grouped by the name of the output they live on
    pub async fn workspaces_per_output(&self) -> Result<BTreeMap<String, Vec<Workspace>>, IpcError> {
        let mut grouped: BTreeMap<String, Vec<Workspace>> = BTreeMap::new();
        for workspace in self.workspaces().await? {
            grouped
                .entry(workspace.output.clone())
                .or_default()
                .push(workspace);
        }
        Ok(grouped)
    }

    pub async fn outputs(&self) -> Result<Vec<Output>, IpcError> {
        self.request_json(MessageKind::GetOutputs, &[]).await
    }

    /// Outputs currently in use
    pub async fn active_outputs(&self) -> Result<Vec<Output>, IpcError> {
        let mut outputs = self.outputs().await?;
        outputs.retain(|output| output.active);
        Ok(outputs)
    }

    pub async fn tree(&self) -> Result<TreeNode, IpcError> {
        self.request_json(MessageKind::GetTree, &[]).await
    }

    pub async fn marks(&self) -> Result<Vec<String>, IpcError> {
        self.request_json(MessageKind::GetMarks, &[]).await
    }

    /// Ids of all configured bars
    pub async fn bar_ids(&self) -> Result<Vec<String>, IpcError> {
        self.request_json(MessageKind::GetBarConfig, &[]).await
    }

    pub async fn bar_config(&self, id: &str) -> Result<BarConfig, IpcError> {
        self.request_json(MessageKind::GetBarConfig, id.as_bytes())
            .await
    }

    pub async fn version(&self) -> Result<Version, IpcError> {
        self.request_json(MessageKind::GetVersion, &[]).await
    }
}

/// Withdraws a registered request if dropped before its frame was queued
struct Unsent<'a> {
    correlator: &'a Correlator,
    kind: ReplyKind,
    armed: bool,
}

impl<'a> Unsent<'a> {
    fn new(correlator: &'a Correlator, kind: ReplyKind) -> Self {
        Self {
            correlator,
            kind,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Unsent<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.correlator.withdraw(self.kind);
        }
    }
}

fn socket_not_ready(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

fn first_success(kind: ReplyKind, replies: &[SuccessReply]) -> Result<bool, IpcError> {
    let first = replies.first().ok_or(IpcError::EmptyReply { kind })?;
    if let Some(error) = &first.error {
        debug!(kind = %kind, error = %error, "i3 reported failure");
    }
    Ok(first.success)
}
