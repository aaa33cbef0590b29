use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::ofp_datapath::handle_client_connected;
use crate::ofp_dispatch::{Application, Dispatcher, Registry};

pub const DEFAULT_PORT: u16 = 6653;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Pause after an accept failure that is not specific to one connection, such as running
/// out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Listener-level failures. These stop the controller; connection failures never do.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid listen port {0}")]
    InvalidPort(u16),
    #[error("outbound queue capacity must be at least 1")]
    InvalidQueueCapacity,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Source of switch connections.
#[async_trait]
pub trait Listener: Send {
    type Io: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Io, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for TcpListener {
    type Io = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, "failed to set TCP_NODELAY: {}", e);
        }
        Ok((stream, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Errors that concern only the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(e.kind(),
             io::ErrorKind::ConnectionAborted |
             io::ErrorKind::ConnectionReset |
             io::ErrorKind::ConnectionRefused)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    /// Entries in each datapath's outbound queue.
    pub queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.port == 0 {
            return Err(ControllerError::InvalidPort(self.port));
        }
        if self.queue_capacity == 0 {
            return Err(ControllerError::InvalidQueueCapacity);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// OpenFlow Controller
///
/// Accepts switch connections and hands every decoded message to the registered applications.
pub struct OfpController {
    config: ControllerConfig,
    registry: Arc<Registry>,
}

impl OfpController {
    pub fn new(config: ControllerConfig) -> OfpController {
        OfpController {
            config,
            registry: Arc::new(Registry::new()),
        }
    }

    /// Append `app` to the applications messages are dispatched to.
    pub fn register_application(&self, app: Arc<dyn Application>) {
        info!(app = app.name(), "registered application");
        self.registry.register(app);
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), ControllerError> {
        self.config.validate()?;
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ControllerError::Bind { addr: addr.clone(), source })?;
        self.serve(listener).await
    }

    /// Accept connections from `listener`, one task per switch. Accept failures are logged
    /// and retried; only invalid configuration ends the loop.
    pub async fn serve<L: Listener>(&self, mut listener: L) -> Result<(), ControllerError> {
        self.config.validate()?;
        info!(addr = ?listener.local_addr().ok(), "listening for switches");
        let dispatcher = Arc::new(Dispatcher::new(self.registry.clone()));
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) if is_connection_error(&e) => {
                    debug!("connection dropped before accept: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("accept failed, retrying in {:?}: {}", ACCEPT_BACKOFF, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let dispatcher = dispatcher.clone();
            let capacity = self.config.queue_capacity;
            tokio::spawn(async move {
                    // Errors are logged inside; one switch never takes down the listener.
                    let _ = handle_client_connected(stream, peer, dispatcher, capacity).await;
                }
                .instrument(info_span!("datapath", %peer)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;

    #[test]
    fn config_validation() {
        assert!(ControllerConfig::default().validate().is_ok());
        let bad_port = ControllerConfig { port: 0, ..ControllerConfig::default() };
        assert!(matches!(bad_port.validate(), Err(ControllerError::InvalidPort(0))));
        let bad_queue = ControllerConfig { queue_capacity: 0, ..ControllerConfig::default() };
        assert!(matches!(bad_queue.validate(), Err(ControllerError::InvalidQueueCapacity)));
    }

    /// Hands out a fixed sequence of accept results, then never accepts again.
    struct Scripted {
        script: VecDeque<io::Result<DuplexStream>>,
    }

    #[async_trait]
    impl Listener for Scripted {
        type Io = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            match self.script.pop_front() {
                Some(next) => next.map(|io| (io, "127.0.0.1:40001".parse().unwrap())),
                None => std::future::pending().await,
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:6653".parse().unwrap())
        }
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn accept_failures_do_not_stop_the_controller() {
        let (mut switch, controller_end) = tokio::io::duplex(1024);
        let listener = Scripted {
            script: VecDeque::from(vec![
                Err(io::ErrorKind::ConnectionAborted.into()),
                // EMFILE
                Err(io::Error::from_raw_os_error(24)),
                Ok(controller_end),
            ]),
        };
        let controller = Arc::new(OfpController::new(ControllerConfig::default()));
        let server = controller.clone();
        let serving = tokio::spawn(async move { server.serve(listener).await });

        let mut hello = [0u8; 8];
        switch.read_exact(&mut hello).await.unwrap();
        assert_eq!(hello, [0x04, 0x00, 0x00, 0x08, 0, 0, 0, 0]);
        assert!(!serving.is_finished());
        assert!(logs_contain("accept failed"));
    }

    #[test]
    fn connection_errors_are_told_apart() {
        assert!(is_connection_error(&io::ErrorKind::ConnectionReset.into()));
        assert!(!is_connection_error(&io::Error::from_raw_os_error(24)));
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let controller = OfpController::new(ControllerConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..ControllerConfig::default()
        });
        assert!(matches!(controller.run().await, Err(ControllerError::Bind { .. })));
    }
}
