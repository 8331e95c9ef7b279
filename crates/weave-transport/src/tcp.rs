use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use weave_codec::{WireCodec, WireMessage};
use weave_document::{Carrier, CarrierState};

use crate::error::{TransportError, TransportResult};
use crate::server::greeting;

pub(crate) const READ_BUFFER: usize = 16 * 1024;

/// State shared between the document thread and the socket worker.
#[derive(Default)]
struct Shared {
    inbound: Mutex<VecDeque<WireMessage>>,
    connected: AtomicBool,
    loaded: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    /// The queue only ever holds whole messages, so a poisoned lock is
    /// still consistent.
    fn inbound(&self) -> MutexGuard<'_, VecDeque<WireMessage>> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Carrier over a framed TCP connection.
///
/// The socket lives on a worker thread running its own tokio runtime.
/// Inbound frames are queued there and handed to the document thread by
/// [`process`](Carrier::process).
pub struct TcpCarrier {
    shared: Arc<Shared>,
    outbound: Option<UnboundedSender<WireMessage>>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    received: VecDeque<WireMessage>,
}

impl TcpCarrier {
    /// Start connecting to `addr` as `user` editing under `actor`. The
    /// carrier reports [`CarrierState::Connecting`] until the greet went out,
    /// and ends disconnected if the server refuses it.
    pub fn connect(addr: SocketAddr, user: u64, actor: u32, session: u64) -> TransportResult<TcpCarrier> {
        let shared = Arc::new(Shared::default());
        let (outbound, outbound_rx) = unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let greet = greeting(user, actor, session);

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new().name("weave-carrier".into()).spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "carrier runtime failed to start");
                    worker_shared.closed.store(true, Ordering::Release);
                    return;
                }
            };
            let result =
                runtime.block_on(run_connection(addr, greet, &worker_shared, outbound_rx, shutdown_rx));
            if let Err(e) = result {
                warn!(%addr, error = %e, "carrier connection failed");
            }
            worker_shared.connected.store(false, Ordering::Release);
            worker_shared.closed.store(true, Ordering::Release);
            info!(%addr, "carrier closed");
        })?;

        Ok(TcpCarrier {
            shared,
            outbound: Some(outbound),
            shutdown: Some(shutdown),
            worker: Some(worker),
            received: VecDeque::new(),
        })
    }
}

pub(crate) async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = WireCodec::encode(msg)?;
    writer.write_all(&frame).await?;
    Ok(())
}

async fn run_connection(
    addr: SocketAddr,
    greet: WireMessage,
    shared: &Shared,
    mut outbound: UnboundedReceiver<WireMessage>,
    mut shutdown: oneshot::Receiver<()>,
) -> TransportResult<()> {
    let stream = tokio::select! {
        _ = &mut shutdown => return Ok(()),
        stream = TcpStream::connect(addr) => stream?,
    };
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    write_message(&mut writer, &greet).await?;
    shared.connected.store(true, Ordering::Release);
    debug!(%addr, "carrier connected");

    let mut buf = BytesMut::with_capacity(READ_BUFFER);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            msg = outbound.recv() => match msg {
                Some(msg) => write_message(&mut writer, &msg).await?,
                None => break,
            },
            read = reader.read_buf(&mut buf) => {
                if read? == 0 {
                    return Err(TransportError::Closed);
                }
                while let Some(msg) = WireCodec::decode_from(&mut buf)? {
                    let backend = matches!(msg, WireMessage::Backend { .. });
                    shared.inbound().push_back(msg);
                    if backend {
                        shared.loaded.store(true, Ordering::Release);
                    }
                }
            }
        }
    }
    writer.shutdown().await?;
    Ok(())
}

impl Carrier for TcpCarrier {
    fn process(&mut self) {
        let mut inbound = self.shared.inbound();
        self.received.extend(inbound.drain(..));
    }

    fn send(&mut self, msg: WireMessage) {
        let delivered = self.outbound.as_ref().is_some_and(|out| out.send(msg).is_ok());
        if !delivered {
            debug!("carrier closed, message dropped");
        }
    }

    fn receive(&mut self) -> Option<WireMessage> {
        self.received.pop_front()
    }

    fn state(&self) -> CarrierState {
        if self.shared.closed.load(Ordering::Acquire) || self.worker.is_none() {
            CarrierState::Disconnected
        } else if self.shared.connected.load(Ordering::Acquire) {
            CarrierState::Connected
        } else {
            CarrierState::Connecting
        }
    }

    fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::Acquire)
    }

    fn disconnect(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.outbound = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("carrier worker panicked");
            }
        }
    }
}

impl Drop for TcpCarrier {
    fn drop(&mut self) {
        self.disconnect();
    }
}
