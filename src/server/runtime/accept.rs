//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::server::connection::{ConnectionContext, spawn_connection_task};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

pub(in crate::server) struct AcceptLoopOptions {
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

struct AcceptHandles<'a> {
    context: &'a ConnectionContext,
    shutdown: &'a CancellationToken,
    tracker: &'a TaskTracker,
    backoff: &'a BackoffConfig,
}

/// Accepts incoming connections and spawns one session task per socket.
///
/// Failures to accept a connection trigger an exponential back-off governed
/// by `options.backoff`; they never end the loop. The loop terminates when
/// `options.shutdown` is cancelled, including while it is backing off, and
/// all spawned tasks are tracked by `options.tracker` for graceful shutdown.
pub(in crate::server) async fn accept_loop<L>(
    listener: Arc<L>,
    context: ConnectionContext,
    options: AcceptLoopOptions,
) where
    L: AcceptListener + Send + Sync + 'static,
{
    let AcceptLoopOptions {
        shutdown,
        tracker,
        backoff,
    } = options;
    let backoff = backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let mut delay = backoff.initial_delay;
    let handles = AcceptHandles {
        context: &context,
        shutdown: &shutdown,
        tracker: &tracker,
        backoff: &backoff,
    };
    while let Some(next_delay) = accept_iteration(&listener, &handles, delay).await {
        delay = next_delay;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &Arc<L>,
    handles: &AcceptHandles<'_>,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener + Send + Sync + 'static,
{
    let res = select! {
        biased;

        () = handles.shutdown.cancelled() => return None,
        res = listener.accept() => res,
    };
    match res {
        Ok((stream, _)) => {
            spawn_connection_task(stream, handles.context.clone(), handles.tracker);
            Some(handles.backoff.initial_delay)
        }
        Err(e) => {
            let local_addr = listener.local_addr().ok();
            warn!("accept error: error={e:?}, local_addr={local_addr:?}");
            select! {
                biased;

                () = handles.shutdown.cancelled() => None,
                () = sleep(delay) => Some(handles.backoff.next_delay(delay)),
            }
        }
    }
}
