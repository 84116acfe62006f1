//! Bounded worker-thread pool with cancellable, waitable units of work.
//!
//! The pool knows nothing about game formats: it drains one shared FIFO
//! queue with a fixed set of OS threads. Queue order is advisory only —
//! several workers drain concurrently, so callers needing ordering must
//! barrier on [`Task::wait`] between stages.
//!
//! Cancellation is cooperative. Every closure receives a [`CancelToken`];
//! cancelling before the task starts guarantees it never executes, while a
//! running task is expected to poll the token at its own checkpoints.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::trace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker count {requested} outside 1..={max}")]
    WorkerCount { requested: usize, max: usize },
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Lifecycle of one queued unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

/// Shared cancellation flag passed through every task closure so the
/// cancellation path is visible in each function's signature.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

type Work = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

#[derive(Debug)]
struct TaskShared {
    state: Mutex<TaskState>,
    done: Condvar,
    token: CancelToken,
}

impl TaskShared {
    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn transition(&self, next: TaskState) {
        let mut state = self.lock_state();
        *state = next;
        if next.is_terminal() {
            self.done.notify_all();
        }
    }
}

/// Cheap handle onto a queued unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    shared: Arc<TaskShared>,
}

impl Task {
    pub fn state(&self) -> TaskState {
        *self.shared.lock_state()
    }

    pub fn completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub fn cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.token.clone()
    }

    /// Requests cooperative cancellation. A task that has not started yet is
    /// guaranteed to be skipped; a running task decides at its own
    /// checkpoints.
    pub fn cancel(&self) {
        self.shared.token.cancel();
    }

    pub fn cancel_and_wait(&self) {
        self.cancel();
        self.wait(None);
    }

    /// Blocks until the task reaches a terminal state. `None` waits
    /// indefinitely; with a timeout, returns `false` if the deadline passes
    /// first.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.shared.lock_state();
        match timeout {
            None => {
                while !state.is_terminal() {
                    state = self
                        .shared
                        .done
                        .wait(state)
                        .unwrap_or_else(|err| err.into_inner());
                }
                true
            }
            Some(limit) => {
                let deadline = Instant::now() + limit;
                while !state.is_terminal() {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self
                        .shared
                        .done
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|err| err.into_inner());
                    state = guard;
                }
                true
            }
        }
    }
}

struct Job {
    shared: Arc<TaskShared>,
    work: Work,
}

struct PoolShared {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl PoolShared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Fixed-size worker pool over one shared task queue.
pub struct TaskPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

fn hardware_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TaskPool {
    /// Default sizing: hardware concurrency minus two, floor one.
    pub fn new() -> Result<Self, PoolError> {
        let workers = hardware_threads().saturating_sub(2).max(1);
        Self::spawn(workers)
    }

    /// Largest worker count [`TaskPool::with_workers`] will accept on this
    /// machine.
    pub fn max_workers() -> usize {
        hardware_threads().saturating_sub(1).max(1)
    }

    /// Explicit sizing; any count up to hardware concurrency minus one is
    /// accepted, anything else is a configuration error.
    pub fn with_workers(workers: usize) -> Result<Self, PoolError> {
        let max = Self::max_workers();
        if workers == 0 || workers > max {
            return Err(PoolError::WorkerCount {
                requested: workers,
                max,
            });
        }
        Self::spawn(workers)
    }

    fn spawn(workers: usize) -> Result<Self, PoolError> {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("terra_worker_{index}"))
                .spawn(move || worker_loop(shared))?;
            handles.push(handle);
        }
        Ok(TaskPool {
            shared,
            workers: handles,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Appends the work to the shared FIFO queue and wakes one worker.
    pub fn queue<F>(&self, work: F) -> Task
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let shared = Arc::new(TaskShared {
            state: Mutex::new(TaskState::Queued),
            done: Condvar::new(),
            token: CancelToken::new(),
        });
        {
            let mut queue = self.shared.lock_queue();
            queue.push_back(Job {
                shared: Arc::clone(&shared),
                work: Box::new(work),
            });
        }
        self.shared.available.notify_one();
        Task { shared }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        // Whatever is still queued will never run; release the waiters.
        let leftovers: Vec<Job> = self.shared.lock_queue().drain(..).collect();
        for job in leftovers {
            job.shared.token.cancel();
            job.shared.transition(TaskState::Cancelled);
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let job = {
            let mut queue = shared.lock_queue();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(|err| err.into_inner());
            }
        };

        if job.shared.token.is_cancelled() {
            trace!("skipping cancelled task before execution");
            job.shared.transition(TaskState::Cancelled);
            continue;
        }

        job.shared.transition(TaskState::Running);
        (job.work)(&job.shared.token);
        job.shared.transition(TaskState::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn every_queued_task_runs_exactly_once() {
        let pool = TaskPool::with_workers(2).expect("pool spawns");
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task> = (0..40)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.queue(move |_token| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in &tasks {
            assert!(task.wait(Some(Duration::from_secs(10))));
            assert!(task.completed());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn cancelling_a_queued_task_prevents_execution() {
        let pool = TaskPool::with_workers(1).expect("pool spawns");
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        // Occupy the single worker so the second task stays queued.
        let blocker = pool.queue(move |_token| {
            started_tx.send(()).ok();
            release_rx.recv().ok();
        });
        started_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("blocker started");

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let doomed = pool.queue(move |_token| {
            flag.store(true, Ordering::SeqCst);
        });
        doomed.cancel();
        release_tx.send(()).expect("release blocker");

        assert!(blocker.wait(Some(Duration::from_secs(10))));
        assert!(doomed.wait(Some(Duration::from_secs(10))));
        assert!(doomed.cancelled());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn running_task_observes_cooperative_cancellation() {
        let pool = TaskPool::with_workers(1).expect("pool spawns");
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let observed = Arc::new(AtomicBool::new(false));
        let observed_in_task = Arc::clone(&observed);
        let task = pool.queue(move |token| {
            started_tx.send(()).ok();
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            observed_in_task.store(true, Ordering::SeqCst);
        });
        started_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("task started");
        task.cancel_and_wait();
        // The closure ran to completion after noticing the token.
        assert!(task.completed());
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_times_out_while_task_is_held() {
        let pool = TaskPool::with_workers(1).expect("pool spawns");
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let task = pool.queue(move |_token| {
            release_rx.recv().ok();
        });
        assert!(!task.wait(Some(Duration::from_millis(50))));
        release_tx.send(()).expect("release");
        assert!(task.wait(Some(Duration::from_secs(10))));
    }

    #[test]
    fn oversized_worker_request_is_rejected() {
        let max = hardware_threads().saturating_sub(1).max(1);
        assert!(matches!(
            TaskPool::with_workers(0),
            Err(PoolError::WorkerCount { .. })
        ));
        assert!(matches!(
            TaskPool::with_workers(max + 1),
            Err(PoolError::WorkerCount { .. })
        ));
    }
}
