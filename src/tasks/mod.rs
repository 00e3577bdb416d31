//! Task handles with blocking results and continuations, on top of rayon.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use rand::Rng;
use rayon::ThreadPool;
use thiserror::Error;

use crate::pool::panic_message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
}

type Continuation<T> = Box<dyn FnOnce(Result<T, TaskError>) + Send>;

struct Slot<T> {
    completed: bool,
    outcome: Option<Result<T, TaskError>>,
    continuation: Option<Continuation<T>>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, outcome: Result<T, TaskError>) {
        let mut slot = self.lock();
        slot.completed = true;
        match slot.continuation.take() {
            Some(continuation) => {
                drop(slot);
                continuation(outcome);
            }
            None => {
                slot.outcome = Some(outcome);
                drop(slot);
                self.ready.notify_all();
            }
        }
    }
}

/// Handle to a value being computed on a worker thread.
pub struct Task<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Task<T> {
    fn pending() -> (Self, Arc<Shared<T>>) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                completed: false,
                outcome: None,
                continuation: None,
            }),
            ready: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }

    /// Runs `f` on rayon's global pool.
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (task, shared) = Self::pending();
        rayon::spawn(move || shared.complete(run_caught(f)));
        task
    }

    /// Runs `f` on a specific pool.
    pub fn spawn_in<F>(pool: &ThreadPool, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (task, shared) = Self::pending();
        pool.spawn(move || shared.complete(run_caught(f)));
        task
    }

    pub fn is_completed(&self) -> bool {
        self.shared.lock().completed
    }

    /// Blocks until the task has finished, without taking its value.
    pub fn join(&self) {
        let mut slot = self.shared.lock();
        while !slot.completed {
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the task has finished and returns its value.
    pub fn wait(self) -> Result<T, TaskError> {
        let mut slot = self.shared.lock();
        loop {
            if let Some(outcome) = slot.outcome.take() {
                return outcome;
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Schedules `f` to run with this task's value once it is available.
    ///
    /// If this task panicked, `f` is skipped and the returned task reports the
    /// same panic.
    pub fn then<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (next, next_shared) = Task::<U>::pending();
        let continuation = move |outcome: Result<T, TaskError>| {
            next_shared.complete(outcome.and_then(|value| run_caught(move || f(value))));
        };

        let mut slot = self.shared.lock();
        match slot.outcome.take() {
            Some(outcome) => {
                drop(slot);
                rayon::spawn(move || continuation(outcome));
            }
            None => slot.continuation = Some(Box::new(continuation)),
        }
        next
    }
}

/// Waits for every task, then returns all values or the first failure.
pub fn wait_all<T: Send + 'static>(tasks: Vec<Task<T>>) -> Result<Vec<T>, TaskError> {
    let outcomes: Vec<_> = tasks.into_iter().map(Task::wait).collect();
    outcomes.into_iter().collect()
}

fn run_caught<T, F: FnOnce() -> T>(f: F) -> Result<T, TaskError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|p| TaskError::Panicked(panic_message(&*p)))
}

/// `name(id)` for the current thread.
pub fn thread_label() -> String {
    let current = thread::current();
    format!("{}({:?})", current.name().unwrap_or("unnamed"), current.id())
}

pub fn threaded_message(msg: impl fmt::Display) {
    println!("{}: {}", thread_label(), msg);
}

pub fn simple_invoke() {
    rayon::join(
        || threaded_message("Hello, from a Task"),
        || threaded_message("Hello, from another task"),
    );
}

pub fn explicit_tasks() -> Result<(), TaskError> {
    let t1 = Task::spawn(|| threaded_message("Hello"));
    let t2 = Task::spawn(|| threaded_message("Hello"));
    let t3 = Task::spawn(|| threaded_message("Hello"));

    threaded_message("Hello");
    wait_all(vec![t1, t2, t3]).map(|_| ())
}

/// Clock ticks in 100ns units since the Unix epoch.
fn ticks() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_nanos() / 100) as f64)
        .unwrap_or(0.0)
}

pub fn task_result() -> Result<f64, TaskError> {
    let task = Task::spawn(|| {
        let random: f64 = rand::thread_rng().gen();
        let result = ticks() * random;
        threaded_message(format!("Calculated {}", result));
        result
    });
    println!("completed = {}", task.is_completed());

    task.join();
    let completed = task.is_completed();
    let res = task.wait()?;
    println!("res = {}, completed = {}", res, completed);
    Ok(res)
}

/// One task per message; each task owns its own `(index, message)` pair.
pub fn tasks_with_data(messages: &[&str]) -> Result<Vec<String>, TaskError> {
    let tasks = messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let data = (i, message.to_string());
            Task::spawn(move || {
                let line = format!(
                    "We are #{} in line and our message is {}",
                    data.0, data.1
                );
                threaded_message(&line);
                line
            })
        })
        .collect();
    wait_all(tasks)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerCharacter {
    pub strength: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub charisma: u8,
}

impl PlayerCharacter {
    /// Six stats, each the sum of three consecutive rolls.
    pub fn from_rolls(rolls: &[u8; 18]) -> Self {
        let stat = |n: usize| rolls[n * 3..n * 3 + 3].iter().sum::<u8>();
        Self {
            strength: stat(0),
            intelligence: stat(1),
            wisdom: stat(2),
            dexterity: stat(3),
            constitution: stat(4),
            charisma: stat(5),
        }
    }

    pub fn stats(&self) -> [u8; 6] {
        [
            self.strength,
            self.intelligence,
            self.wisdom,
            self.dexterity,
            self.constitution,
            self.charisma,
        ]
    }
}

pub fn roll_dice<R: Rng + ?Sized>(rng: &mut R) -> [u8; 18] {
    let mut rolls = [0u8; 18];
    for roll in rolls.iter_mut() {
        *roll = rng.gen_range(1..=6);
    }
    rolls
}

/// Rolls dice on one task and builds a character from them in a continuation.
pub fn continuations() -> Result<PlayerCharacter, TaskError> {
    let player = Task::spawn(|| roll_dice(&mut rand::thread_rng()))
        .then(|rolls| PlayerCharacter::from_rolls(&rolls))
        .wait()?;
    debug!("rolled {:?}", player);
    println!("{:?}", player);
    Ok(player)
}

/// Every demonstration, in order.
pub fn run_all() -> Result<(), TaskError> {
    simple_invoke();
    explicit_tasks()?;
    task_result()?;
    tasks_with_data(&["One", "Two", "Three"])?;
    continuations()?;
    Ok(())
}
