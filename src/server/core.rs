//! The accept loop.
//!
//! `Server::bind` claims the control socket and builds the shared state;
//! `run` accepts connections and spawns one session task each, bounded by
//! `max_sessions`. Ctrl-C stops accepting, notifies every session through a
//! watch channel, and gives them a short drain window.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::protocol::Reply;
use crate::session::run_session;
use crate::transfer::PassivePortPool;

/// How long `run` waits for live sessions after shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by every session. Built once at startup, read-only after.
pub struct ServerContext {
    pub config: ServerConfig,
    pub store: CredentialStore,
    pub pool: Arc<PassivePortPool>,
}

/// A bound FTP server, ready to accept clients.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

/// Occupies one session slot; the slot frees itself when the session task
/// ends, however it ends.
struct SessionSlot(Arc<AtomicUsize>);

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Binds the control listener. A bind failure (port taken, bad address)
    /// is returned to the caller so startup can fail loudly.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.control_socket()).await?;
        info!("Listening on {}", listener.local_addr()?);

        let store = CredentialStore::from_config(&config);
        let pool = PassivePortPool::new(config.data_port_range());
        info!(
            "Passive ports {}-{}, {} max sessions",
            config.data_port_min, config.data_port_max, config.max_sessions
        );

        Ok(Self {
            listener,
            ctx: Arc::new(ServerContext {
                config,
                store,
                pool,
            }),
        })
    }

    /// The actual control address, useful when bound to port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves clients until Ctrl-C.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accepts and serves clients until `signal` resolves, then drains.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> io::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let active = Arc::new(AtomicUsize::new(0));
        tokio::pin!(signal);

        loop {
            let accepted = tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {e}");
                    continue;
                }
            };

            if active.load(Ordering::SeqCst) >= self.ctx.config.max_sessions {
                warn!("Rejecting {peer}: session limit reached");
                tokio::spawn(reject(stream));
                continue;
            }

            active.fetch_add(1, Ordering::SeqCst);
            let slot = SessionSlot(active.clone());
            let ctx = self.ctx.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                run_session(stream, peer, ctx, shutdown).await;
                drop(slot);
            });
        }

        let _ = shutdown_tx.send(true);
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while active.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        match drained {
            Ok(()) => info!("All sessions closed"),
            Err(_) => warn!(
                "{} sessions still open after drain timeout",
                active.load(Ordering::SeqCst)
            ),
        }
        Ok(())
    }
}

/// Turns away a client over the session limit.
async fn reject(mut stream: TcpStream) {
    let reply = Reply::too_many_connections();
    let _ = stream.write_all(reply.as_wire().as_bytes()).await;
    let _ = stream.shutdown().await;
}
