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
//! Utilities for managing tasks and shutdown.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A combination of a [tokio::task::JoinSet] and
/// [tokio_util::sync::CancellationToken].
///
/// Provides methods that are commonly used in conjunction with those two data
/// structures.
pub struct CancelTaskSet {
    /// Task set join set.
    pub join_set: JoinSet<Result<(), std::io::Error>>,
    cancellation_token: CancellationToken,
}

impl CancelTaskSet {
    /// Creates a new task set.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::from_cancel_token(false, CancellationToken::new())
    }

    /// Creates a task set and registers a signal handler that calls `cancel()`
    /// on the cancellation token upon receiving `SIGINT` and `SIGTERM`.
    pub fn new_with_signal_handler() -> Self {
        Self::from_cancel_token(true, CancellationToken::new())
    }

    /// Creates a task set from an existing cancellation token.
    ///
    /// # Arguments
    /// * `register_signal_handler`: If true, a signal handler is registered that calls `cancel()`
    ///   on the cancellation token upon receiving `SIGINT` and `SIGTERM`.
    /// * `cancellation_token`: The cancellation token to use.
    pub fn from_cancel_token(
        register_signal_handler: bool,
        cancellation_token: CancellationToken,
    ) -> Self {
        let mut join_set = JoinSet::new();
        if register_signal_handler {
            Self::spawn_shutdown_handler(&mut join_set, cancellation_token.clone());
        }
        CancelTaskSet {
            join_set,
            cancellation_token,
        }
    }

    /// Returns a clone of the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    fn spawn_shutdown_handler(
        join_set: &mut JoinSet<Result<(), std::io::Error>>,
        cancellation_token: CancellationToken,
    ) {
        join_set.spawn(async move {
            let res = Self::wait_for_shutdown_signal(&cancellation_token).await;
            if let Err(e) = &res {
                error!(error=%e, "Shutdown signal handler failed");
            }
            res
        });
    }

    async fn wait_for_shutdown_signal(
        cancellation_token: &CancellationToken,
    ) -> Result<(), std::io::Error> {
        #[cfg(target_family = "unix")]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;
            tokio::select! {
                _ = sigint.recv() => {
                    debug!("Received SIGINT, cancelling token");
                    cancellation_token.cancel();
                },
                _ = sigterm.recv() => {
                    debug!("Received SIGTERM, cancelling token");
                    cancellation_token.cancel();
                },
                _ = cancellation_token.cancelled() => {
                    debug!("Cancellation token cancelled, exiting shutdown handler");
                },
            }
        }

        #[cfg(not(target_family = "unix"))]
        {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    res?;
                    debug!("Received CTRL-C, cancelling token");
                    cancellation_token.cancel();
                },
                _ = cancellation_token.cancelled() => {
                    debug!("Cancellation token cancelled, exiting shutdown handler");
                },
            }
        }

        Ok(())
    }

    /// Spawns a task that runs `on_cancel` once the token is cancelled.
    ///
    /// Used to forward a shutdown request to components with their own stop
    /// mechanism.
    pub fn spawn_on_cancel<F>(&mut self, on_cancel: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.cancellation_token();
        self.join_set.spawn(async move {
            token.cancelled().await;
            on_cancel();
            Ok(())
        });
    }

    /// Spawns a task that will run until it is cancelled or completes.
    pub fn spawn_cancellable_task<Fut>(&mut self, task: Fut)
    where
        Fut: Future<Output = Result<(), std::io::Error>> + Send + 'static,
    {
        let token = self.cancellation_token();
        self.join_set.spawn(async move {
            match token.run_until_cancelled(task).await {
                Some(Ok(_)) => Ok(()),  // task completed successfully
                Some(Err(e)) => Err(e), // task failed
                None => Ok(()),         // task was successfully cancelled
            }
        });
    }

    /// Joins all tasks in the set. If any task fails to join or returns an error, cancel the token
    /// to signal a graceful shutdown to the remaining tasks.
    pub async fn join_all(&mut self) {
        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok(Ok(())) => {} // Task completed successfully
                Ok(Err(e)) => {
                    error!(error=%e, "Task failed");
                    self.cancellation_token.cancel();
                }
                Err(e) => {
                    error!(error=%e, "Task join failed");
                    self.cancellation_token.cancel();
                }
            }
        }
    }
}

impl Drop for CancelTaskSet {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
        self.join_set.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[test_log::test(tokio::test)]
    #[ntest::timeout(5_000)]
    async fn on_cancel_runs_once_after_cancellation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut task_set = CancelTaskSet::new();
        task_set.spawn_on_cancel({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        task_set.cancellation_token().cancel();
        task_set.join_all().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    #[ntest::timeout(5_000)]
    async fn failing_task_cancels_the_others() {
        let mut task_set = CancelTaskSet::new();
        task_set.spawn_cancellable_task(std::future::pending());
        task_set.spawn_cancellable_task(async { Err(std::io::Error::other("boom")) });

        task_set.join_all().await;
        assert!(task_set.cancellation_token().is_cancelled());
    }
}
