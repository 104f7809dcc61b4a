use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use repopilot_db::models::TaskPatch;
use repopilot_db::Store;
use repopilot_executors::AgentRunner;

use crate::task_executor::TaskExecutor;

/// Worker pool + janitor, one OS thread each: the scheduling model is
/// deliberately plain threads rather than a tokio task pool, so that one
/// slow/blocking task (subprocess I/O, a stuck git command) can never starve
/// another worker's turn. Each worker thread owns a small current-thread
/// tokio runtime to drive the otherwise-async `TaskExecutor`.
pub struct Scheduler {
    store: Arc<Store>,
    runner: Arc<AgentRunner>,
    executor: Arc<TaskExecutor>,
    workers: usize,
    logs_retention_days: i64,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    janitor: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, runner: Arc<AgentRunner>, executor: Arc<TaskExecutor>, workers: usize, logs_retention_days: i64) -> Self {
        Self {
            store,
            runner,
            executor,
            workers,
            logs_retention_days,
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            janitor: None,
        }
    }

    /// Spawn `workers` daemon worker threads plus one janitor. A no-op if
    /// already started.
    pub fn start(&mut self) {
        if !self.threads.is_empty() {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);

        for idx in 0..self.workers {
            let worker_id = format!("worker-{idx}");
            let store = self.store.clone();
            let executor = self.executor.clone();
            let stop = self.stop.clone();
            let handle = std::thread::Builder::new()
                .name(worker_id.clone())
                .spawn(move || worker_loop(worker_id, store, executor, stop))
                .expect("spawn worker thread");
            self.threads.push(handle);
        }

        let store = self.store.clone();
        let stop = self.stop.clone();
        let retention_days = self.logs_retention_days;
        self.janitor = Some(
            std::thread::Builder::new()
                .name("janitor".to_string())
                .spawn(move || janitor_loop(store, retention_days, stop))
                .expect("spawn janitor thread"),
        );
    }

    /// Signal all threads to stop and join them with a short timeout each.
    /// `JoinHandle` has no timed join, so this just joins unconditionally —
    /// threads check `stop` at sub-second granularity and exit promptly.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.janitor.take() {
            let _ = handle.join();
        }
    }

    /// Forward a cancel request to the running subprocess, if any. Does not
    /// touch task status itself — the HTTP handler already set the sticky
    /// flag (or transitioned the task directly for non-running states).
    pub fn request_cancel(&self, task_id: &str) {
        tracing::info!(task_id, "terminating process for task");
        self.runner.cancel(task_id);
    }
}

fn worker_loop(worker_id: String, store: Arc<Store>, executor: Arc<TaskExecutor>, stop: Arc<AtomicBool>) {
    #[allow(clippy::expect_used)]
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("build worker runtime");

    while !stop.load(Ordering::SeqCst) {
        let claimed = match store.claim_next_task(&worker_id) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "claim_next_task failed");
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        let Some(task) = claimed else {
            std::thread::sleep(Duration::from_secs(1));
            continue;
        };

        tracing::info!(worker_id, task_id = %task.id, "claimed task");
        let task_id = task.id.clone();
        if let Err(err) = rt.block_on(executor.run_task(&task, &worker_id)) {
            tracing::error!(worker_id, task_id = %task_id, error = %err, "unhandled executor error, marking SCHEDULER_CRASH");
            let _ = store.update_task(
                &task_id,
                TaskPatch {
                    status: Some(repopilot_db::models::TaskStatus::Failed),
                    error_code: Some("SCHEDULER_CRASH".to_string()),
                    error_message: Some(err.to_string()),
                    ..Default::default()
                },
            );
        }
    }
}

fn janitor_loop(store: Arc<Store>, retention_days: i64, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match store.cleanup_old_logs(retention_days) {
            Ok(deleted) if deleted > 0 => tracing::info!(deleted, "janitor cleaned up old task logs"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "janitor cleanup_old_logs failed"),
        }

        for _ in 0..3600 {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    }
}
