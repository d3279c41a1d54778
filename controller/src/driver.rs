// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manages execution of background tasks
//!
//! Each registered task runs in its own tokio task and is *activated* when
//! its period elapses, when a caller explicitly requests it, or when one of
//! its dependency watch channels changes.  Activation runs the task's work
//! function once; the driver records status around it for observability.

use chrono::DateTime;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use futures::StreamExt;
use slog::{debug, o, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

/// An operation driven by the [`Driver`]
///
/// The returned JSON value is a task-specific status report, surfaced through
/// [`Driver::task_status()`] for debugging.
pub trait BackgroundTask: Send + Sync {
    fn activate<'a>(
        &'a mut self,
        log: &'a Logger,
    ) -> BoxFuture<'a, serde_json::Value>;
}

/// Identifies a task registered with a [`Driver`]
#[derive(Clone, Debug, Ord, PartialOrd, PartialEq, Eq)]
pub struct TaskName(String);

/// Why a task was activated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationReason {
    Signaled,
    Timeout,
    Dependency,
}

/// Runtime status of one background task
#[derive(Clone, Debug, Default)]
pub struct TaskStatus {
    /// if the task is currently running, when and why it started
    pub current: Option<CurrentRun>,
    /// the most recent completed activation
    pub last: Option<LastResult>,
}

#[derive(Clone, Debug)]
pub struct CurrentRun {
    pub start_time: DateTime<Utc>,
    pub start_instant: Instant,
    pub reason: ActivationReason,
    pub iteration: u64,
}

#[derive(Clone, Debug)]
pub struct LastResult {
    pub iteration: u64,
    pub start_time: DateTime<Utc>,
    pub reason: ActivationReason,
    pub elapsed: Duration,
    pub details: serde_json::Value,
}

/// Drives the execution of background tasks
///
/// There is one `Driver` per controller process.  All tasks are registered at
/// startup; the driver provides interfaces for waking them explicitly and for
/// inspecting their status.
pub struct Driver {
    tasks: BTreeMap<TaskName, Task>,
}

/// Driver-side state of one background task
struct Task {
    description: String,
    period: Duration,
    status: watch::Receiver<TaskStatus>,
    tokio_task: tokio::task::JoinHandle<()>,
    notify: Arc<Notify>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver { tasks: BTreeMap::new() }
    }

    /// Register a new background task
    ///
    /// The driver activates the task whenever `period` elapses, whenever
    /// [`Driver::activate()`] is called for it, and whenever any of the
    /// `watchers` channels changes.  Panics if `name` was already registered;
    /// task names are a process-level namespace.
    pub fn register(
        &mut self,
        name: String,
        description: String,
        period: Duration,
        imp: Box<dyn BackgroundTask>,
        log: &Logger,
        watchers: Vec<Box<dyn GenericWatcher>>,
    ) -> TaskName {
        let (status_tx, status_rx) = watch::channel(TaskStatus::default());
        let notify = Arc::new(Notify::new());

        let task_log = log.new(o!("background_task" => name.clone()));
        let task_exec = TaskExec {
            period,
            imp,
            notify: Arc::clone(&notify),
            log: task_log,
            status_tx,
            iteration: 0,
        };
        let tokio_task = tokio::task::spawn(task_exec.run(watchers));

        let task =
            Task { description, period, status: status_rx, tokio_task, notify };
        if self.tasks.insert(TaskName(name.clone()), task).is_some() {
            panic!("started two background tasks called {:?}", name);
        }

        TaskName(name)
    }

    /// Enumerate all registered tasks
    pub fn tasks(&self) -> impl Iterator<Item = &TaskName> {
        self.tasks.keys()
    }

    fn task_required(&self, task: &TaskName) -> &Task {
        self.tasks.get(task).unwrap_or_else(|| {
            panic!("attempted to access non-existent background task {:?}", task)
        })
    }

    pub fn task_description(&self, task: &TaskName) -> &str {
        &self.task_required(task).description
    }

    pub fn task_period(&self, task: &TaskName) -> Duration {
        self.task_required(task).period
    }

    /// Activate the given task as soon as possible
    ///
    /// If the task is currently running, it runs again when it finishes.
    /// Multiple pending activations are collapsed into one.
    pub fn activate(&self, task: &TaskName) {
        self.task_required(task).notify.notify_one();
    }

    /// Returns the runtime status of the given task
    pub fn task_status(&self, task: &TaskName) -> TaskStatus {
        // Borrowing from a watch channel's receiver blocks the sender, so
        // clone rather than handing out a reference.
        self.task_required(task).status.borrow().clone()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        for (_, t) in &self.tasks {
            t.tokio_task.abort();
        }
    }
}

/// State owned by the tokio task that manages activation of one background
/// task
struct TaskExec {
    period: Duration,
    imp: Box<dyn BackgroundTask>,
    notify: Arc<Notify>,
    log: Logger,
    status_tx: watch::Sender<TaskStatus>,
    iteration: u64,
}

impl TaskExec {
    async fn run(mut self, mut deps: Vec<Box<dyn GenericWatcher>>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let mut dependencies: FuturesUnordered<_> =
                deps.iter_mut().map(|w| w.wait_for_change()).collect();

            tokio::select! {
                _ = interval.tick() => {
                    self.activate(ActivationReason::Timeout).await;
                },

                _ = self.notify.notified() => {
                    self.activate(ActivationReason::Signaled).await;
                }

                _ = dependencies.next(), if !dependencies.is_empty() => {
                    self.activate(ActivationReason::Dependency).await;
                }
            }
        }
    }

    async fn activate(&mut self, reason: ActivationReason) {
        self.iteration += 1;
        let iteration = self.iteration;
        let start_time = Utc::now();
        let start_instant = Instant::now();

        debug!(&self.log, "activating";
            "reason" => ?reason,
            "iteration" => iteration,
        );

        self.status_tx.send_modify(|status| {
            status.current = Some(CurrentRun {
                start_time,
                start_instant,
                reason,
                iteration,
            });
        });

        let details = self.imp.activate(&self.log).await;

        let elapsed = start_instant.elapsed();
        self.status_tx.send_modify(|status| {
            status.current = None;
            status.last = Some(LastResult {
                iteration,
                start_time,
                reason,
                elapsed,
                details,
            });
        });

        debug!(&self.log, "activation complete";
            "elapsed" => ?elapsed,
            "iteration" => iteration,
        );
    }
}

/// Erases the item type of a `tokio::sync::watch::Receiver` so the driver can
/// treat dependency channels uniformly
pub trait GenericWatcher: Send {
    fn wait_for_change(
        &mut self,
    ) -> BoxFuture<'_, Result<(), watch::error::RecvError>>;
}

impl<T: Send + Sync> GenericWatcher for watch::Receiver<T> {
    fn wait_for_change(
        &mut self,
    ) -> BoxFuture<'_, Result<(), watch::error::RecvError>> {
        async { self.changed().await }.boxed()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nodepool_image_test_utils::dev::poll;
    use nodepool_image_test_utils::dev::test_setup_log;
    use tokio::sync::watch;

    /// Reports how many times it has been activated over a watch channel
    struct ReportingTask {
        counter: usize,
        tx: watch::Sender<usize>,
    }

    impl ReportingTask {
        fn new() -> (ReportingTask, watch::Receiver<usize>) {
            let (tx, rx) = watch::channel(0);
            (ReportingTask { counter: 1, tx }, rx)
        }
    }

    impl BackgroundTask for ReportingTask {
        fn activate<'a>(
            &'a mut self,
            _: &'a Logger,
        ) -> BoxFuture<'a, serde_json::Value> {
            async {
                let count = self.counter;
                self.counter += 1;
                self.tx.send_replace(count);
                serde_json::json!(count)
            }
            .boxed()
        }
    }

    async fn wait_until_count(mut rx: watch::Receiver<usize>, count: usize) {
        loop {
            let v = rx.borrow_and_update();
            assert!(*v <= count, "count went past what we expected");
            if *v == count {
                return;
            }
            drop(v);

            tokio::time::timeout(Duration::from_secs(15), rx.changed())
                .await
                .expect("timed out waiting for task activation")
                .expect("task dropped its status channel");
        }
    }

    #[tokio::test]
    async fn test_driver_basic() {
        let logctx = test_setup_log("test_driver_basic");

        let (t1, rx1) = ReportingTask::new();
        let (t2, rx2) = ReportingTask::new();
        let (dep_tx, dep_rx) = watch::channel(0);
        let mut driver = Driver::new();

        let h1 = driver.register(
            "t1".to_string(),
            "test task".to_string(),
            Duration::from_millis(100),
            Box::new(t1),
            &logctx.log,
            vec![Box::new(dep_rx.clone())],
        );

        let h2 = driver.register(
            "t2".to_string(),
            "test task".to_string(),
            // Should never fire during this test.
            Duration::from_secs(300),
            Box::new(t2),
            &logctx.log,
            vec![Box::new(dep_rx)],
        );

        assert_eq!(driver.task_period(&h1), Duration::from_millis(100));
        assert_eq!(driver.task_description(&h2), "test task");

        // Both tasks activate once immediately on registration, then "t1"
        // keeps activating on its period.
        wait_until_count(rx1.clone(), 4).await;
        wait_until_count(rx2.clone(), 1).await;

        // The driver's status for "t1" catches up with its activations.
        poll::wait_for_condition(
            || async {
                match driver.task_status(&h1).last {
                    Some(last) if last.iteration >= 3 => Ok(last),
                    _ => Err(poll::CondCheckError::<()>::NotYet),
                }
            },
            &Duration::from_millis(50),
            &Duration::from_secs(15),
        )
        .await
        .map(|last| assert!(last.details.as_u64().is_some()))
        .expect("t1 never reported a completed activation");

        async fn wait_for_reason(
            driver: &Driver,
            task: &TaskName,
            iteration: u64,
            reason: ActivationReason,
        ) {
            poll::wait_for_condition(
                move || async move {
                    match driver.task_status(task).last {
                        Some(last) if last.iteration == iteration => {
                            assert_eq!(last.reason, reason);
                            Ok(())
                        }
                        _ => Err(poll::CondCheckError::<()>::NotYet),
                    }
                },
                &Duration::from_millis(50),
                &Duration::from_secs(15),
            )
            .await
            .expect("task never completed the expected activation");
        }

        // A dependency change activates both tasks.
        dep_tx.send_replace(1);
        wait_until_count(rx2.clone(), 2).await;
        wait_for_reason(&driver, &h2, 2, ActivationReason::Dependency).await;

        // An explicit activation wakes just "t2".
        driver.activate(&h2);
        wait_until_count(rx2.clone(), 3).await;
        wait_for_reason(&driver, &h2, 3, ActivationReason::Signaled).await;

        logctx.cleanup_successful();
    }

    #[tokio::test]
    #[should_panic(expected = "started two background tasks")]
    async fn test_duplicate_name_panics() {
        let logctx = test_setup_log("test_duplicate_name_panics");
        let (t1, _rx1) = ReportingTask::new();
        let (t2, _rx2) = ReportingTask::new();
        let mut driver = Driver::new();
        for t in [t1, t2] {
            driver.register(
                "dup".to_string(),
                "test task".to_string(),
                Duration::from_secs(300),
                Box::new(t),
                &logctx.log,
                vec![],
            );
        }
    }
}
