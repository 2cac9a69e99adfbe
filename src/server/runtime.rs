//! Runtime control for [`DrugServer`].

mod accept;
mod backoff;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::warn;
use tokio::{select, signal, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use super::{Bound, DrugServer, ServerError, connection::ConnectionContext};

impl DrugServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use drugwire::{
    ///     cache::LookupCache,
    ///     dispatch::Dispatcher,
    ///     server::DrugServer,
    ///     store::SqliteStore,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = Arc::new(SqliteStore::open("druginfo.db")?);
    /// let dispatcher = Dispatcher::new(store, Arc::new(LookupCache::new()));
    /// DrugServer::new(dispatcher)
    ///     .bind(([127, 0, 0, 1], 8443).into())?
    ///     .run()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    ///
    /// use drugwire::{
    ///     cache::LookupCache,
    ///     dispatch::Dispatcher,
    ///     server::DrugServer,
    ///     store::SqliteStore,
    /// };
    ///
    /// async fn try_run(store: Arc<SqliteStore>) {
    ///     DrugServer::new(Dispatcher::new(store, Arc::new(LookupCache::new())))
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// On shutdown the accept loop stops and open sessions close at their
    /// next read. Sessions still running after the grace period are
    /// abandoned with a warning.
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let DrugServer {
            dispatcher,
            session,
            tls,
            ready_tx,
            backoff_config,
            shutdown_grace,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let local_addr = listener.local_addr().ok();
        let tls_enabled = tls.is_some();
        let context = ConnectionContext {
            dispatcher,
            session,
            tls,
            shutdown: shutdown_token.clone(),
        };

        tracker.spawn(accept_loop(
            listener,
            context,
            AcceptLoopOptions {
                shutdown: shutdown_token.clone(),
                tracker: tracker.clone(),
                backoff: backoff_config,
            },
        ));

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }
        info!(?local_addr, tls = tls_enabled, "accepting connections");

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        if timeout(shutdown_grace, tracker.wait()).await.is_err() {
            warn!(
                "shutdown grace period elapsed: abandoned_tasks={}, grace={shutdown_grace:?}",
                tracker.len()
            );
        }
        info!(?local_addr, "server stopped");
        Ok(())
    }
}
