//! Multi-party protocols run over the [`crate::overlay`].
//!
//! Every protocol is built from a [`TreeNodeInstance`](crate::overlay::TreeNodeInstance)
//! and hands back a [`Finished`] receiver that resolves with this node's
//! outcome, success or failure, once its instance completes.

use rocket::tokio::sync::oneshot;

use crate::error::Result;

pub mod dkg;
pub mod shuffle;

#[cfg(feature = "decrypt")]
pub mod decrypt;

/// Resolves with the outcome of one node's protocol instance.
pub type Finished<T> = oneshot::Receiver<Result<T>>;

/// Completion side of [`Finished`].
pub(crate) type Done<T> = Option<oneshot::Sender<Result<T>>>;

pub(crate) fn finished<T>() -> (Done<T>, Finished<T>) {
    let (done, finished) = oneshot::channel();
    (Some(done), finished)
}

/// Hand `outcome` to whoever waits on `done`. An error nobody is waiting
/// for is returned instead, so that the overlay logs it.
pub(crate) fn complete<T>(done: &mut Done<T>, outcome: Result<T>) -> Result<()> {
    match done.take() {
        Some(done) => match done.send(outcome) {
            Err(Err(e)) => Err(e),
            _ => Ok(()),
        },
        None => outcome.map(drop),
    }
}
