use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use weave_codec::{SnapshotFile, WireCodec};

use crate::config::ServerConfig;
use crate::error::TransportResult;
use crate::server::{DocumentServer, SessionId};
use crate::tcp::{write_message, READ_BUFFER};

fn lock(server: &Mutex<DocumentServer>) -> MutexGuard<'_, DocumentServer> {
    server.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serves a [`DocumentServer`] over framed TCP and autosaves it.
pub struct DocumentListener {
    listener: TcpListener,
    server: Arc<Mutex<DocumentServer>>,
    config: ServerConfig,
}

impl DocumentListener {
    pub async fn bind(config: ServerConfig, server: DocumentServer) -> TransportResult<Self> {
        config.file_tags()?;
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "document server listening");
        Ok(Self { listener, server: Arc::new(Mutex::new(server)), config })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn server(&self) -> Arc<Mutex<DocumentServer>> {
        Arc::clone(&self.server)
    }

    /// Accept connections until `shutdown` resolves, then save once more.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> TransportResult<()> {
        let tags = self.config.file_tags()?;
        let limit = Arc::new(Semaphore::new(self.config.max_connections));
        let mut autosave = tokio::time::interval(self.config.autosave_interval());
        autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = autosave.tick() => self.autosave(&tags),
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                        warn!(%peer, "connection limit reached");
                        continue;
                    };
                    let server = Arc::clone(&self.server);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, server).await {
                            debug!(%peer, error = %e, "connection ended");
                        }
                        drop(permit);
                    });
                }
            }
        }
        self.autosave(&tags);
        info!("document server stopped");
        Ok(())
    }

    fn autosave(&self, tags: &SnapshotFile) {
        let Some(path) = self.config.snapshot_path.as_deref() else {
            return;
        };
        let (snapshot, version) = {
            let server = lock(&self.server);
            if !server.is_dirty() {
                return;
            }
            (server.snapshot(), server.revision())
        };
        match tags.write(path, &snapshot) {
            Ok(()) => {
                lock(&self.server).mark_saved(version);
                debug!(path = %path.display(), "autosaved");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "autosave failed, document stays dirty"),
        }
    }
}

async fn serve_connection(stream: TcpStream, server: Arc<Mutex<DocumentServer>>) -> TransportResult<()> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    let (mut reader, mut writer) = stream.into_split();
    let (outbox, mut outbound) = unbounded_channel();
    let session = lock(&server).open_session(outbox);
    info!(session, %peer, "client connected");

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = write_message(&mut writer, &msg).await {
                debug!(session, error = %e, "write failed");
                break;
            }
        }
    });

    let result = read_frames(&mut reader, &server, session).await;
    lock(&server).close_session(session);
    let _ = writer_task.await;
    result
}

async fn read_frames(
    reader: &mut OwnedReadHalf,
    server: &Mutex<DocumentServer>,
    session: SessionId,
) -> TransportResult<()> {
    let mut buf = BytesMut::with_capacity(READ_BUFFER);
    loop {
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
        while let Some(msg) = WireCodec::decode_from(&mut buf)? {
            let mut server = lock(server);
            server.handle(session, msg);
            if !server.has_session(session) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc::unbounded_channel;
    use weave_codec::WireMessage;
    use weave_graph::Graph;
    use weave_schema::{ClassRegistry, FieldKind};
    use weave_types::TxId;

    use super::*;
    use crate::server::greeting;

    fn registry() -> Arc<ClassRegistry> {
        let mut r = ClassRegistry::new("listener-test.1");
        r.declare("lt.Root").member("count", FieldKind::Int).finish();
        r.set_root("lt.Root");
        Arc::new(r.seal())
    }

    /// A server holding one accepted edit.
    fn edited_server() -> DocumentServer {
        let mut server = DocumentServer::new(registry());
        let (outbox, _inbound) = unbounded_channel();
        let session = server.open_session(outbox);
        server.handle(session, greeting(1, 1, 0));

        let mut g = Graph::new(registry(), 1);
        let count = g.member(g.root(), "count").unwrap();
        g.set_int(count, 5);
        let mut tx = g.make();
        tx.set_id(TxId::new(1, 1, 1));
        server.handle(session, WireMessage::Tx { tx });
        assert!(server.is_dirty());
        server
    }

    async fn listener(snapshot_path: std::path::PathBuf) -> DocumentListener {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            snapshot_path: Some(snapshot_path),
            ..ServerConfig::default()
        };
        DocumentListener::bind(config, edited_server()).await.unwrap()
    }

    #[tokio::test]
    async fn failed_autosave_keeps_the_document_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut listener = listener(blocker.join("doc.weave")).await;
        let tags = listener.config.file_tags().unwrap();
        listener.autosave(&tags);
        assert!(lock(&listener.server).is_dirty());

        let path = dir.path().join("doc.weave");
        listener.config.snapshot_path = Some(path.clone());
        listener.autosave(&tags);
        assert!(!lock(&listener.server).is_dirty());
        assert_eq!(tags.read(&path, "listener-test.1").unwrap(), lock(&listener.server).snapshot());
    }

    #[tokio::test]
    async fn edits_accepted_during_a_save_stay_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let listener = listener(dir.path().join("doc.weave")).await;
        let mut server = lock(&listener.server);
        let saved = server.revision();
        let (outbox, _inbound) = unbounded_channel();
        let session = server.open_session(outbox);
        server.handle(session, greeting(2, 2, 0));
        let mut g = Graph::new(registry(), 2);
        g.load_snapshot(&server.snapshot()).unwrap();
        let count = g.member(g.root(), "count").unwrap();
        g.set_int(count, 6);
        let mut tx = g.make();
        tx.set_id(TxId::new(2, 2, 1));
        server.handle(session, WireMessage::Tx { tx });

        server.mark_saved(saved);
        assert!(server.is_dirty());
        let latest = server.revision();
        server.mark_saved(latest);
        assert!(!server.is_dirty());
    }
}
