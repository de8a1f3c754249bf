// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! One-shot shutdown signal shared between the lease operations.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned when a [CancellationSignal] is closed a second time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cancellation signal already closed")]
pub struct AlreadyClosed;

/// A single-writer, multi-reader broadcast flag.
///
/// The signal starts open and transitions to closed exactly once. Closing is
/// guarded by a compare-and-set on the flag, so only the first call to
/// [CancellationSignal::close] has an effect; any further call returns
/// [AlreadyClosed]. Readers either poll [CancellationSignal::is_closed] or
/// await [CancellationSignal::closed].
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    closed: AtomicBool,
    token: CancellationToken,
}

impl CancellationSignal {
    /// Creates a new, open signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the signal and wakes up every waiter.
    pub fn close(&self) -> Result<(), AlreadyClosed> {
        self.inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AlreadyClosed)?;
        self.inner.token.cancel();
        Ok(())
    }

    /// Returns true once the signal has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Waits until the signal is closed. Returns immediately if it already is.
    pub async fn closed(&self) {
        self.inner.token.cancelled().await
    }

    /// Runs `fut` until it completes or the signal is closed, whichever happens first.
    ///
    /// Returns `None` if the signal was closed before `fut` completed.
    pub async fn run_until_closed<F: Future>(&self, fut: F) -> Option<F::Output> {
        self.inner.token.run_until_cancelled(fut).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn close_succeeds_exactly_once() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_closed());

        assert_eq!(signal.close(), Ok(()));
        assert!(signal.is_closed());

        assert_eq!(signal.close(), Err(AlreadyClosed));
        assert!(signal.is_closed(), "signal must never reopen");
    }

    #[test]
    fn clones_share_state() {
        let signal = CancellationSignal::new();
        let reader = signal.clone();

        signal.close().unwrap();
        assert!(reader.is_closed());
        assert_eq!(reader.close(), Err(AlreadyClosed));
    }

    #[test_log::test(tokio::test)]
    async fn closed_returns_immediately_when_already_closed() {
        let signal = CancellationSignal::new();
        signal.close().unwrap();

        tokio::time::timeout(Duration::from_secs(1), signal.closed())
            .await
            .expect("closed() must not block on a closed signal");
    }

    #[test_log::test(tokio::test)]
    async fn close_wakes_all_waiters() {
        let signal = CancellationSignal::new();

        let mut waiters = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let signal = signal.clone();
            waiters.spawn(async move { signal.closed().await });
        }

        // Let the waiters register before closing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.close().unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiters.join_all())
            .await
            .expect("all waiters must be woken up");
    }

    #[test_log::test(tokio::test)]
    async fn concurrent_close_has_a_single_winner() {
        let signal = CancellationSignal::new();

        let mut closers = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let signal = signal.clone();
            closers.spawn(async move { signal.close().is_ok() });
        }

        let winners = closers
            .join_all()
            .await
            .into_iter()
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test_log::test(tokio::test)]
    async fn run_until_closed_stops_pending_future() {
        let signal = CancellationSignal::new();
        let closer = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close().unwrap();
        });

        let res = signal.run_until_closed(std::future::pending::<()>()).await;
        assert!(res.is_none());
    }
}
