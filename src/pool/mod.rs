use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::PassError;
use crate::parallel::barrier::CompletionBarrier;

/// A unit of work handed to a pool. It may borrow from the caller's stack.
pub type Job<'a, R> = Box<dyn FnOnce() -> R + Send + 'a>;

/// Outcome of a job that unwound instead of returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panicked(pub String);

/// Something that can run a batch of jobs and wait for all of them.
///
/// `dispatch` submits every job, blocks until each one has finished, and
/// returns one outcome per job in submission order. A panicking job never
/// unwinds into the caller.
pub trait WorkerPool: Sync {
    fn workers(&self) -> usize;

    fn dispatch<'a, R: Send + 'a>(&self, jobs: Vec<Job<'a, R>>) -> Vec<Result<R, Panicked>>;
}

/// Runs every job on the calling thread, in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn workers(&self) -> usize {
        1
    }

    fn dispatch<'a, R: Send + 'a>(&self, jobs: Vec<Job<'a, R>>) -> Vec<Result<R, Panicked>> {
        jobs.into_iter().map(run_caught).collect()
    }
}

/// A bounded rayon thread pool.
///
/// `dispatch` blocks the calling thread on a [`CompletionBarrier`], so it must
/// not be called from one of this pool's own workers.
pub struct RayonPool {
    pool: ThreadPool,
}

impl RayonPool {
    pub fn new(threads: usize) -> Result<Self, PassError> {
        if threads == 0 {
            return Err(PassError::InvalidArgument(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("worker-{}", i))
            .build()
            .map_err(|e| PassError::ResourceExhaustion(e.to_string()))?;

        debug!("started rayon pool with {} threads", threads);
        Ok(Self { pool })
    }
}

impl WorkerPool for RayonPool {
    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn dispatch<'a, R: Send + 'a>(&self, jobs: Vec<Job<'a, R>>) -> Vec<Result<R, Panicked>> {
        let slots: Vec<Mutex<Option<Result<R, Panicked>>>> =
            jobs.iter().map(|_| Mutex::new(None)).collect();
        let barrier = CompletionBarrier::new(jobs.len());

        self.pool.in_place_scope(|scope| {
            for (job, slot) in jobs.into_iter().zip(&slots) {
                let barrier = &barrier;
                scope.spawn(move |_| {
                    let outcome = run_caught(job);
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
                    barrier.signal();
                });
            }
            barrier.wait();
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unwrap_or_else(|| Err(Panicked("job never reported".to_string())))
            })
            .collect()
    }
}

fn run_caught<R>(job: Job<'_, R>) -> Result<R, Panicked> {
    panic::catch_unwind(AssertUnwindSafe(job)).map_err(|payload| Panicked(panic_message(&*payload)))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
