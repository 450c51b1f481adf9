//! Single-flight coordination for session refresh.
//!
//! Any number of requests can be rejected at once when the access credential
//! expires. Only the first of them starts a refresh exchange; the rest join
//! the pending one and observe the same outcome. The slot is emptied when
//! the exchange settles, so the next expiry starts a fresh exchange.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::debug;

type Pending<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;
type Slot<T, E> = Arc<Mutex<Option<Pending<T, E>>>>;

pub struct RefreshCoordinator<T, E> {
    inflight: Slot<T, E>,
}

fn lock<T, E>(slot: &Slot<T, E>) -> MutexGuard<'_, Option<Pending<T, E>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> RefreshCoordinator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.inflight).is_some()
    }

    /// Joins the pending exchange, or starts one with `start` when idle.
    ///
    /// `start` is only invoked when no exchange is pending.
    pub async fn run<F, Fut>(&self, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let pending = {
            let mut slot = lock(&self.inflight);
            if let Some(pending) = slot.as_ref() {
                debug!("joining in-flight refresh");
                pending.clone()
            } else {
                let inflight = Arc::clone(&self.inflight);
                let exchange = start();
                let pending = async move {
                    let outcome = exchange.await;
                    lock(&inflight).take();
                    outcome
                }
                .boxed()
                .shared();
                *slot = Some(pending.clone());
                pending
            }
        };
        pending.await
    }
}

impl<T, E> Default for RefreshCoordinator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for RefreshCoordinator<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refreshing = self
            .inflight
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &refreshing)
            .finish()
    }
}
