//! Deferred single-result operations.

use super::error::{RepoError, RepoResult};
use crate::store::handle::Handle;
use crate::worker::{Worker, WorkerContext};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type DeferredJob<R> = Box<dyn FnOnce(&mut WorkerContext, oneshot::Sender<RepoResult<R>>) + Send>;

enum State<R> {
    Deferred { worker: Worker, job: DeferredJob<R> },
    Scheduled(oneshot::Receiver<RepoResult<R>>),
    Finished,
}

/// Result of a repository write or one-shot read.
///
/// Nothing runs until the completion is first polled; it is then scheduled
/// behind everything already queued on the worker. Once scheduled, the
/// operation runs even if the completion is dropped.
#[must_use = "the operation is scheduled when the completion is first polled"]
pub struct Completion<R = ()> {
    state: State<R>,
}

impl<R: Send + 'static> Completion<R> {
    pub(crate) fn deferred(
        worker: Worker,
        op: impl FnOnce(&mut Handle) -> RepoResult<R> + Send + 'static,
    ) -> Self {
        let job: DeferredJob<R> = Box::new(
            move |ctx: &mut WorkerContext, reply: oneshot::Sender<RepoResult<R>>| {
                let result = match ctx.current_handle() {
                    Some(handle) => op(handle),
                    None => Err(RepoError::WorkerUnavailable),
                };
                let _ = reply.send(result);
            },
        );
        Self {
            state: State::Deferred { worker, job },
        }
    }

    /// Returns whether the operation has been handed to the worker.
    pub fn is_scheduled(&self) -> bool {
        !matches!(self.state, State::Deferred { .. })
    }
}

impl<R> Unpin for Completion<R> {}

impl<R: Send + 'static> Future for Completion<R> {
    type Output = RepoResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, State::Finished) {
                State::Deferred { worker, job } => {
                    let (reply, rx) = oneshot::channel();
                    if worker.schedule(move |ctx| job(ctx, reply)).is_err() {
                        return Poll::Ready(Err(RepoError::WorkerUnavailable));
                    }
                    this.state = State::Scheduled(rx);
                }
                State::Scheduled(mut rx) => {
                    return match Pin::new(&mut rx).poll(cx) {
                        Poll::Ready(Ok(result)) => Poll::Ready(result),
                        Poll::Ready(Err(_dropped)) => Poll::Ready(Err(RepoError::WorkerUnavailable)),
                        Poll::Pending => {
                            this.state = State::Scheduled(rx);
                            Poll::Pending
                        }
                    };
                }
                State::Finished => panic!("`Completion` polled after it resolved"),
            }
        }
    }
}
