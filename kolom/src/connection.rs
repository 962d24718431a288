//! Database connection.
use std::future::poll_fn;
use tokio::time::Instant;

use crate::{
    Error, Result,
    common::{debug, error, span, unit_error, verbose},
    compress::Method,
    net::Socket,
    phase::{self, HandshakeConfig, Session},
    protocol::{revision, server::ServerInfo},
    query::QueryOptions,
    stream::Stream,
    transport::Timeout,
};

mod config;

pub use config::{Config, ParseError};

/// Liveness of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Idle, ready for the next query.
    Ready,
    /// A query or batch is in flight.
    Querying,
    /// Terminal, the socket is gone.
    Closed,
}

/// A single connection to the server.
///
/// A connection runs one query at a time. Any io, protocol or server error
/// while querying closes it.
#[derive(Debug)]
pub struct Connection {
    /// `None` when closed, or while a forwarding task reads the rows.
    stream: Option<Stream>,
    state: State,
    server: ServerInfo,
    session: Session,
    block_buffer_size: usize,
    connected_at: Instant,
}

impl Connection {
    /// Perform a handshake via url.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Perform a handshake with config from environment.
    ///
    /// See [`Config::from_env`] for more details on env.
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()).await
    }

    /// Perform a handshake with config.
    ///
    /// Dialing and handshake are bounded by the dial timeout.
    pub async fn connect_with(config: Config) -> Result<Self> {
        let dial = async {
            let socket = match config.host.starts_with('/') {
                #[cfg(unix)]
                true => Socket::connect_socket(&config.host).await?,
                _ => Socket::connect_tcp(&config.host, config.port).await?,
            };
            Self::handshake(socket, &config).await
        };

        match tokio::time::timeout(config.dial_timeout, dial).await {
            Ok(result) => result,
            Err(_) => Err(Error::from(Timeout).context("dial")),
        }
    }

    /// Perform a handshake over an already connected socket.
    pub async fn connect_with_socket(socket: Socket, config: Config) -> Result<Self> {
        match tokio::time::timeout(config.dial_timeout, Self::handshake(socket, &config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::from(Timeout).context("handshake")),
        }
    }

    async fn handshake(socket: Socket, config: &Config) -> Result<Self> {
        let mut stream = Stream::new(socket);
        stream.set_read_timeout(config.read_timeout);

        let result = phase::handshake(&mut stream, HandshakeConfig {
            client_name: &config.client_name,
            database: &config.database,
            user: &config.user,
            password: &config.pass,
            quota_key: &config.quota_key,
        })
        .await;

        let server = match result {
            Ok(server) => server,
            Err(err) => {
                error!("handshake failed: {err}");
                return Err(err);
            },
        };

        stream.set_revision(server.revision.min(revision::CLIENT));
        stream.set_compression(config.compression);

        debug!(
            "connected to {} {}.{}.{}, revision {}",
            server.display_name.as_deref().unwrap_or(&server.name),
            server.major,
            server.minor,
            server.patch,
            stream.revision(),
        );

        let session = Session {
            client_name: config.client_name.to_string(),
            quota_key: config.quota_key.to_string(),
            os_user: std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_default(),
            hostname: std::env::var("HOSTNAME").unwrap_or_default(),
            compression: config.compression.is_some(),
        };

        Ok(Self {
            stream: Some(stream),
            state: State::Ready,
            server,
            session,
            block_buffer_size: config.block_buffer_size,
            connected_at: Instant::now(),
        })
    }

    /// Server identity from the handshake.
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// Negotiated revision, the lower of client and server.
    pub fn revision(&self) -> u64 {
        self.server.revision.min(revision::CLIENT)
    }

    pub fn compression(&self) -> Option<Method> {
        self.stream.as_ref().and_then(Stream::compression)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Returns `true` if the connection cannot run the next query.
    pub fn is_bad(&self) -> bool {
        self.state != State::Ready
    }

    /// Check that the server responds.
    pub async fn ping(&mut self) -> Result<()> {
        self.begin()?;
        let result = match self.stream.as_mut() {
            Some(stream) => phase::ping(stream).await,
            None => Err(ConnectionClosed.into()),
        };
        self.end(result)
    }

    /// Shutdown the socket, the connection is closed afterwards.
    pub async fn close(&mut self) -> Result<()> {
        self.state = State::Closed;
        match self.stream.take() {
            Some(mut stream) => {
                verbose!("connection close");
                Ok(poll_fn(|cx| stream.poll_shutdown(cx)).await?)
            },
            None => Ok(()),
        }
    }
}

/// Query lifecycle.
impl Connection {
    /// Transition to querying.
    ///
    /// A connection left querying was abandoned mid query, thus closed.
    fn begin(&mut self) -> Result<()> {
        match self.state {
            State::Ready if self.stream.is_some() => {
                self.state = State::Querying;
                Ok(())
            },
            State::Querying => {
                debug!("connection abandoned while querying");
                self.mark_closed();
                Err(ConnectionClosed.into())
            },
            _ => Err(ConnectionClosed.into()),
        }
    }

    /// Write a query to the stream and transition to querying.
    ///
    /// Flushing is required after call.
    pub(crate) fn send_query(&mut self, sql: &str, options: &QueryOptions) -> Result<()> {
        options.validate()?;
        self.begin()?;

        span!("query", id = %options.query_id);
        verbose!(sql, "send");

        let Connection { stream: Some(stream), session, .. } = self else {
            return Err(ConnectionClosed.into());
        };

        stream.set_deadline(options.deadline);

        match phase::send_query(&mut *stream, sql, options, session) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Stream of the running query.
    pub(crate) fn stream_mut(&mut self) -> Result<&mut Stream> {
        match (self.state, self.stream.as_mut()) {
            (State::Querying, Some(stream)) => Ok(stream),
            _ => Err(ConnectionClosed.into()),
        }
    }

    /// Give the stream to a forwarding task.
    pub(crate) fn take_stream(&mut self) -> Option<Stream> {
        match self.state {
            State::Querying => self.stream.take(),
            _ => None,
        }
    }

    /// Take back the stream of a complete query.
    pub(crate) fn restore_stream(&mut self, stream: Stream) {
        self.stream = Some(stream);
        self.finish();
    }

    /// The running query is complete.
    pub(crate) fn finish(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.set_deadline(None);
            self.state = State::Ready;
        }
    }

    /// Close on failure, returning the error back.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        error!("query failed, connection closed: {err}");
        self.mark_closed();
        err
    }

    pub(crate) fn end<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(ok) => {
                self.finish();
                Ok(ok)
            },
            Err(err) => Err(self.fail(err)),
        }
    }

    pub(crate) fn mark_closed(&mut self) {
        self.stream = None;
        self.state = State::Closed;
    }

    pub(crate) fn block_buffer_size(&self) -> usize {
        self.block_buffer_size
    }
}

unit_error! {
    /// Connection is closed, or was left in the middle of a query.
    pub struct ConnectionClosed("connection closed");
}
