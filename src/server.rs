//! HTTP server lifecycle.
//!
//! A [`Server`] owns one TCP listener and walks through
//! `Running → Draining → Stopped`. Draining starts when the shutdown future
//! resolves: the listener stops accepting, in-flight connections get up to the
//! grace period to finish, and whatever is left after that is cut off.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Observable lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

/// How a [`Server::run`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished inside the grace period
    Graceful,
    /// The grace period ran out and remaining connections were dropped
    Forced,
}

/// Expand the `:port` shorthand to `0.0.0.0:port`.
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: watch::Sender<LifecycleState>,
}

impl Server {
    /// Bind the listener. Fails if the address is unusable.
    pub async fn bind(addr: &str) -> Result<Self> {
        let addr = normalize_listen_addr(addr);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
        let local_addr = listener.local_addr()?;
        let (state, _) = watch::channel(LifecycleState::Running);

        Ok(Self {
            listener,
            local_addr,
            state,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serve `router` until `shutdown` resolves, then drain for up to `grace`.
    ///
    /// Every connection runs in a tracked task. Once the grace period is
    /// over the tasks still alive are aborted, which drops their sockets and
    /// any handler they were running.
    pub async fn run<F>(self, router: Router, shutdown: F, grace: Duration) -> Result<ShutdownOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            local_addr,
            state,
        } = self;

        info!("Gateway listening on http://{}", local_addr);

        let draining = CancellationToken::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        connections.spawn(serve_connection(
                            stream,
                            remote,
                            router.clone(),
                            draining.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        drop(listener);
        state.send_replace(LifecycleState::Draining);
        info!(
            connections = connections.len(),
            "Shutdown requested, draining in-flight requests"
        );
        draining.cancel();

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        let outcome = match drained {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    connections = connections.len(),
                    "Grace period elapsed, closing remaining connections"
                );
                connections.abort_all();
                while connections.join_next().await.is_some() {}
                ShutdownOutcome::Forced
            }
        };

        state.send_replace(LifecycleState::Stopped);
        info!(outcome = ?outcome, "Gateway stopped");
        Ok(outcome)
    }
}

/// Serve HTTP/1 on one connection until the peer leaves or draining starts.
///
/// Requests are handled inside this task, so aborting it cancels them too.
async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    router: Router,
    draining: CancellationToken,
) {
    let service = TowerToHyperService::new(router);
    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let served = tokio::select! {
        served = conn.as_mut() => served,
        _ = draining.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = served {
        debug!(remote = %remote, "Connection closed with error: {}", e);
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
