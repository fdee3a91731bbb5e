//! Change-stream adapter: live collections as push streams of snapshots.
//!
//! # Responsibility
//! - Register a live collection with the worker and emit its initial snapshot.
//! - Re-emit a full snapshot whenever a committed change alters the
//!   collection's contents or order.
//! - Unregister on cancellation or drop.
//!
//! # Invariants
//! - Snapshots are decoded into owned entities on the worker before sending.
//! - `cancel` is idempotent; once it returns, `poll_next` yields `None`.
//! - A decode or store error is delivered once and ends the stream.
//! - The stream ends when the worker stops and its handle is closed.
//! - Only the newest undelivered snapshot is kept; a slow subscriber skips
//!   intermediate states instead of buffering them.

use crate::model::entity::Identifiable;
use crate::query::compile::CompiledQuery;
use crate::repo::error::{RepoError, RepoResult};
use crate::store::handle::Handle;
use crate::store::live::{LiveCollection, StoredRow};
use crate::worker::{Observer, Worker};
use futures::task::AtomicWaker;
use futures::Stream;
use log::debug;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Single-slot handoff between the worker and one subscriber.
struct Mailbox<T> {
    latest: Mutex<Option<RepoResult<Vec<T>>>>,
    closed: AtomicBool,
    waker: AtomicWaker,
}

impl<T> Mailbox<T> {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            closed: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    /// Replaces any undelivered item.
    fn publish(&self, item: RepoResult<Vec<T>>) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(item);
        self.waker.wake();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.waker.wake();
    }

    fn take(&self) -> Option<RepoResult<Vec<T>>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Worker-side end of a mailbox. Dropping it ends the subscriber's stream.
struct Publisher<T> {
    mailbox: Arc<Mailbox<T>>,
}

impl<T> Publisher<T> {
    fn publish(&self, item: RepoResult<Vec<T>>) {
        self.mailbox.publish(item);
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.mailbox.close();
    }
}

/// Decodes stored rows into owned entities, preserving order.
pub fn decode_rows<T: Identifiable>(rows: &[StoredRow]) -> RepoResult<Vec<T>> {
    rows.iter()
        .map(|row| {
            serde_json::from_str(&row.body).map_err(|err| {
                RepoError::InvalidData(format!(
                    "collection `{}` entity `{}`: {err}",
                    T::COLLECTION,
                    row.id
                ))
            })
        })
        .collect()
}

struct ChangeStream<T> {
    id: u64,
    collection: LiveCollection,
    publisher: Publisher<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T: Identifiable> Observer for ChangeStream<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn table(&self) -> &str {
        self.collection.table()
    }

    fn deliver(&mut self, handle: &Handle) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        match self.collection.refresh(handle) {
            Ok(None) => true,
            Ok(Some(rows)) => match decode_rows::<T>(rows) {
                Ok(snapshot) => {
                    self.publisher.publish(Ok(snapshot));
                    true
                }
                Err(err) => {
                    self.publisher.publish(Err(err));
                    false
                }
            },
            Err(err) => {
                self.publisher.publish(Err(err.into()));
                false
            }
        }
    }
}

/// Active interest in a live query.
///
/// Yields the initial snapshot, then one snapshot per effective change.
/// Dropping the subscription cancels it.
#[must_use = "streams do nothing unless polled"]
pub struct Subscription<T> {
    id: u64,
    mailbox: Arc<Mailbox<T>>,
    cancelled: Arc<AtomicBool>,
    worker: Worker,
}

impl<T: Identifiable> Subscription<T> {
    /// Schedules a fresh live collection for `query` on the worker.
    pub(crate) fn start(worker: &Worker, query: CompiledQuery) -> Self {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let publisher = Publisher {
            mailbox: Arc::clone(&mailbox),
        };
        let job_cancelled = Arc::clone(&cancelled);
        let scheduled = worker.schedule(move |ctx| {
            if job_cancelled.load(Ordering::SeqCst) {
                return;
            }
            let Some(handle) = ctx.current_handle() else {
                publisher.publish(Err(RepoError::WorkerUnavailable));
                return;
            };
            let collection = match LiveCollection::open(handle, query) {
                Ok(collection) => collection,
                Err(err) => {
                    publisher.publish(Err(err.into()));
                    return;
                }
            };
            let mut stream = ChangeStream {
                id,
                collection,
                publisher,
                cancelled: job_cancelled,
            };
            if stream.deliver(handle) {
                ctx.register(Box::new(stream));
            }
        });
        if scheduled.is_err() {
            mailbox.publish(Err(RepoError::WorkerUnavailable));
            mailbox.close();
        }

        debug!(
            "event=subscription_start module=stream subscription_id={id} collection={}",
            T::COLLECTION
        );
        Self {
            id,
            mailbox,
            cancelled,
            worker: worker.clone(),
        }
    }
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops delivery and unregisters the observer. Safe to call repeatedly.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let id = self.id;
        // A stopped worker has nothing left to unregister.
        let _ = self.worker.schedule_quiet(move |ctx| ctx.unregister(id));
        debug!("event=subscription_cancel module=stream subscription_id={id}");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T> Unpin for Subscription<T> {}

impl<T> Stream for Subscription<T> {
    type Item = RepoResult<Vec<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled.load(Ordering::SeqCst) {
            return Poll::Ready(None);
        }
        this.mailbox.waker.register(cx.waker());
        // Read `closed` first: everything published before closing is then
        // visible to `take`.
        let closed = this.mailbox.closed.load(Ordering::SeqCst);
        if let Some(item) = this.mailbox.take() {
            return Poll::Ready(Some(item));
        }
        if closed {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::{Mailbox, Publisher};
    use crate::repo::error::RepoError;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[test]
    fn newer_items_replace_undelivered_ones() {
        let mailbox = Mailbox::<u32>::new();

        for n in 0..100 {
            mailbox.publish(Ok(vec![n]));
        }

        assert_eq!(mailbox.take().unwrap().unwrap(), vec![99]);
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn dropping_the_publisher_closes_after_the_last_item() {
        let mailbox = Arc::new(Mailbox::<u32>::new());
        let publisher = Publisher {
            mailbox: Arc::clone(&mailbox),
        };

        publisher.publish(Err(RepoError::WorkerUnavailable));
        drop(publisher);

        assert!(mailbox.closed.load(Ordering::SeqCst));
        assert!(matches!(mailbox.take(), Some(Err(RepoError::WorkerUnavailable))));
    }
}
