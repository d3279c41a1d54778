// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quick-and-dirty polling within tests

use std::future::Future;
use std::time::Duration;
use std::time::Instant;

/// Result of one check of a polled condition
#[derive(Debug, thiserror::Error)]
pub enum CondCheckError<E> {
    #[error("poll condition not yet ready")]
    NotYet,
    #[error("permanent failure while polling")]
    Failed(#[source] E),
}

impl<E> From<E> for CondCheckError<E> {
    fn from(error: E) -> CondCheckError<E> {
        CondCheckError::Failed(error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("permanent failure while polling")]
    PermanentError(#[source] E),
}

/// Polls `cond` every `poll_interval` until it succeeds, fails permanently,
/// or `poll_max` has elapsed
pub async fn wait_for_condition<T, E, Func, Fut>(
    mut cond: Func,
    poll_interval: &Duration,
    poll_max: &Duration,
) -> Result<T, Error<E>>
where
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CondCheckError<E>>>,
{
    let start = Instant::now();
    loop {
        match cond().await {
            Ok(value) => return Ok(value),
            Err(CondCheckError::Failed(error)) => {
                return Err(Error::PermanentError(error));
            }
            Err(CondCheckError::NotYet) => (),
        }

        if start.elapsed() >= *poll_max {
            return Err(Error::TimedOut(*poll_max));
        }
        tokio::time::sleep(*poll_interval).await;
    }
}
