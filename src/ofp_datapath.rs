//! Per-connection engine: handshake, framing, and the read and write paths.
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::ofp_dispatch::Dispatcher;
use crate::ofp_header::{OfpHeader, OFP_MAX_MESSAGE_LEN, OPENFLOW_0_04_VERSION};
use crate::ofp_message::{OfpMessage, OfpSerializationError};
use crate::openflow0x04::{ErrorMsg, Hello, Message};

/// Failure of a single switch connection.
#[derive(Debug, Error)]
pub enum DatapathError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The write path is gone; nothing more can be sent on this connection.
    #[error("connection closed")]
    Closed,
    /// The message does not fit the 16-bit header length and was not queued.
    #[error("message of {length} bytes exceeds the OpenFlow maximum")]
    Oversized { length: usize },
    #[error("unframeable message length {length}")]
    Framing { length: usize },
    #[error("peer does not support OpenFlow 1.3 (hello version {version:#04x})")]
    IncompatibleVersion { version: u8 },
    #[error(transparent)]
    Decode(#[from] OfpSerializationError),
    #[error("write task failed: {0}")]
    Task(#[from] JoinError),
}

/// Lifecycle of a switch connection.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnState {
    Connecting = 0,
    HelloSent = 1,
    Handshaking = 2,
    Established = 3,
    Closed = 4,
}

impl ConnState {
    fn of_int(s: u8) -> ConnState {
        match s {
            0 => ConnState::Connecting,
            1 => ConnState::HelloSent,
            2 => ConnState::Handshaking,
            3 => ConnState::Established,
            _ => ConnState::Closed,
        }
    }
}

/// An entry on a datapath's outbound queue.
#[derive(Debug)]
pub enum Outbound {
    Message { xid: u32, message: Message },
    /// Flush everything queued before this marker, then shut the transport down.
    Close,
}

/// Handle to one connected switch, shared with every application handler.
#[derive(Debug)]
pub struct Datapath {
    peer: SocketAddr,
    datapath_id: OnceLock<u64>,
    version: AtomicU8,
    state: AtomicU8,
    xid: AtomicU32,
    tx: mpsc::Sender<Outbound>,
}

impl Datapath {
    /// A datapath whose outbound queue (of `capacity` entries) is drained by the caller
    /// through the returned receiver.
    pub fn channel(peer: SocketAddr, capacity: usize) -> (Arc<Datapath>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let dp = Datapath {
            peer,
            datapath_id: OnceLock::new(),
            version: AtomicU8::new(0),
            state: AtomicU8::new(ConnState::Connecting as u8),
            xid: AtomicU32::new(1),
            tx,
        };
        (Arc::new(dp), rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The switch's datapath id, known once its features reply has been received.
    pub fn datapath_id(&self) -> Option<u64> {
        self.datapath_id.get().copied()
    }

    /// Protocol version agreed on during the hello exchange.
    pub fn version(&self) -> Option<u8> {
        match self.version.load(Ordering::Acquire) {
            0 => None,
            v => Some(v),
        }
    }

    pub fn state(&self) -> ConnState {
        ConnState::of_int(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn next_xid(&self) -> u32 {
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue `message` under a fresh transaction id, which is returned. Waits only while the
    /// queue is full.
    pub async fn send(&self, message: Message) -> Result<u32, DatapathError> {
        let xid = self.next_xid();
        self.reply(xid, message).await?;
        Ok(xid)
    }

    /// Queue `message` under the transaction id of the request it answers.
    pub async fn reply(&self, xid: u32, message: Message) -> Result<(), DatapathError> {
        let length = Message::size_of(&message);
        if length > OFP_MAX_MESSAGE_LEN {
            return Err(DatapathError::Oversized { length });
        }
        self.tx
            .send(Outbound::Message { xid, message })
            .await
            .map_err(|_| DatapathError::Closed)
    }

    /// Ask the write path to flush and close the connection. Closing twice is harmless.
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
    }

    async fn process_frame(self: &Arc<Self>,
                           frame: &[u8],
                           dispatcher: &Dispatcher)
                           -> Result<(), DatapathError> {
        let header = OfpHeader::parse(frame)?;
        let (xid, msg) = match Message::parse(&header, &frame[OfpHeader::size()..]) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(xid = header.xid(), typ = header.typ(), "dropping message: {}", e);
                return Ok(());
            }
        };
        debug!(xid, code = ?Message::msg_code_of_message(&msg), "received");
        match msg {
            Message::Hello(ref hello) => self.negotiate(header.version(), hello).await,
            Message::FeaturesReply(ref feats) => {
                if self.datapath_id.set(feats.datapath_id).is_err() &&
                   self.datapath_id() != Some(feats.datapath_id) {
                    warn!(datapath_id = feats.datapath_id, "switch reported a different datapath id");
                }
                if self.state() < ConnState::Established {
                    self.set_state(ConnState::Established);
                    info!(datapath_id = format_args!("{:#018x}", feats.datapath_id),
                          tables = feats.num_tables,
                          "switch connected");
                }
                dispatcher.dispatch(xid, &msg, self).await;
                Ok(())
            }
            _ => {
                dispatcher.dispatch(xid, &msg, self).await;
                Ok(())
            }
        }
    }

    async fn negotiate(&self, version: u8, hello: &Hello) -> Result<(), DatapathError> {
        if self.state() >= ConnState::Handshaking {
            debug!("ignoring repeated hello");
            return Ok(());
        }
        let compatible = hello.supports(OPENFLOW_0_04_VERSION)
            .unwrap_or(version >= OPENFLOW_0_04_VERSION);
        if !compatible {
            warn!(version, "peer does not speak OpenFlow 1.3");
            self.send(Message::Error(ErrorMsg::hello_incompatible("OpenFlow 1.3 required")))
                .await?;
            self.close().await;
            return Err(DatapathError::IncompatibleVersion { version });
        }
        self.version.store(OPENFLOW_0_04_VERSION, Ordering::Release);
        self.set_state(ConnState::Handshaking);
        self.send(Message::FeaturesRequest).await?;
        Ok(())
    }
}

/// Splits an accumulated byte stream into whole OpenFlow messages.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    pub fn new() -> Framer {
        Framer::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// The next complete message, or `None` until more bytes arrive. A length field below the
    /// header size leaves no way to find the next message boundary.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, DatapathError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let length = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if length < OfpHeader::size() {
            return Err(DatapathError::Framing { length });
        }
        if self.buf.len() < length {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(length).freeze()))
    }
}

async fn read_loop<R>(mut reader: R,
                      dp: Arc<Datapath>,
                      dispatcher: Arc<Dispatcher>)
                      -> Result<(), DatapathError>
    where R: AsyncRead + Unpin
{
    let mut framer = Framer::new();
    loop {
        while let Some(frame) = framer.next_frame()? {
            dp.process_frame(&frame, &dispatcher).await?;
        }
        if reader.read_buf(&mut framer.buf).await? == 0 {
            debug!(pending = framer.buffered(), "peer closed the connection");
            return Ok(());
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Outbound>) -> Result<(), DatapathError>
    where W: AsyncWrite + Unpin
{
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Message { xid, message } => {
                let bytes = Message::marshal(xid, &message);
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                debug!(xid, code = ?Message::msg_code_of_message(&message), "sent");
            }
            Outbound::Close => break,
        }
    }
    writer.shutdown().await?;
    Ok(())
}

/// Drive one switch connection to completion: send the initial Hello, then run the read
/// path inline and the write path as a spawned task until either ends.
pub async fn handle_client_connected<S>(stream: S,
                                        peer: SocketAddr,
                                        dispatcher: Arc<Dispatcher>,
                                        queue_capacity: usize)
                                        -> Result<(), DatapathError>
    where S: AsyncRead + AsyncWrite + Send + Unpin + 'static
{
    let (reader, mut writer) = tokio::io::split(stream);
    let (dp, rx) = Datapath::channel(peer, queue_capacity);

    writer.write_all(&Message::marshal(0, &Message::Hello(Hello::default()))).await?;
    writer.flush().await?;
    dp.set_state(ConnState::HelloSent);
    info!("hello sent");

    let mut write_task = tokio::spawn(write_loop(writer, rx));
    let result = tokio::select! {
        read = read_loop(reader, dp.clone(), dispatcher) => {
            match read {
                // Let the error reply reach the peer before the transport goes away.
                Err(DatapathError::IncompatibleVersion { .. }) => {
                    if let Ok(Err(e)) = (&mut write_task).await {
                        debug!("write path ended: {}", e);
                    }
                }
                _ => write_task.abort(),
            }
            read
        }
        written = &mut write_task => written.map_err(DatapathError::from).and_then(|w| w),
    };
    dp.set_state(ConnState::Closed);
    match result {
        Ok(()) => info!(datapath_id = ?dp.datapath_id(), "connection closed"),
        Err(ref e) => warn!(datapath_id = ?dp.datapath_id(), "connection closed: {}", e),
    }
    result
}
