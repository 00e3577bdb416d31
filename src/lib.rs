pub mod dirsum;
pub mod error;
pub mod ledger;
pub mod parallel;
pub mod pool;
pub mod progress;
pub mod tasks;

pub use error::{Fault, PassError};
pub use parallel::{ChunkedUpdater, ParallelProcessor, PassReport};
pub use pool::{InlinePool, RayonPool, WorkerPool};
