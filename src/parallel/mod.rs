pub mod barrier;

use std::fmt;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

use indicatif::ProgressBar;
use log::{debug, warn};

use crate::error::{Fault, PassError};
use crate::pool::{panic_message, Job, WorkerPool};

/// Worker-count policy for the CLI: an explicit count, or one per logical CPU.
pub struct ParallelProcessor {
    num_workers: usize,
}

impl ParallelProcessor {
    pub fn new(num_workers: Option<usize>) -> Self {
        let num_workers = num_workers.unwrap_or_else(num_cpus::get);

        Self { num_workers }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Chunk size this processor would use for `len` records.
    pub fn chunk_size(&self, len: usize) -> Result<usize, PassError> {
        chunk_size(len, self.num_workers)
    }
}

/// A contiguous run of records owned by one worker for one pass.
#[derive(Debug)]
pub struct Chunk<'a, T> {
    pub index: usize,
    /// Position of the first record in the full sequence.
    pub offset: usize,
    pub records: &'a mut [T],
}

impl<T> Chunk<'_, T> {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.records.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub chunks: usize,
    pub records: usize,
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} records in {} chunks", self.records, self.chunks)
    }
}

/// `floor(len / workers) + 1`, so a pass never needs more than `workers` chunks.
pub fn chunk_size(len: usize, workers: usize) -> Result<usize, PassError> {
    if workers == 0 {
        return Err(PassError::InvalidArgument(
            "worker count must be at least 1".to_string(),
        ));
    }
    Ok((len / workers).saturating_add(1))
}

/// Index ranges `partition` would hand out for a sequence of `len` records.
pub fn chunk_ranges(len: usize, workers: usize) -> Result<Vec<Range<usize>>, PassError> {
    let size = chunk_size(len, workers)?;
    Ok((0..len)
        .step_by(size)
        .map(|start| start..start.saturating_add(size).min(len))
        .collect())
}

/// Splits `records` into disjoint, in-order chunks, one per worker at most.
pub fn partition<T>(records: &mut [T], workers: usize) -> Result<Vec<Chunk<'_, T>>, PassError> {
    let size = chunk_size(records.len(), workers)?;

    let chunks: Vec<_> = records
        .chunks_mut(size)
        .enumerate()
        .map(|(index, records)| Chunk {
            index,
            offset: index * size,
            records,
        })
        .collect();

    debug!(
        "partitioned into {} chunks of up to {} records for {} workers",
        chunks.len(),
        size,
        workers
    );
    Ok(chunks)
}

/// Applies `transform` to every record of every chunk, one pool job per chunk,
/// and returns once all of them have finished.
///
/// Faults do not stop a worker: it records them and moves on to the next
/// record. If any chunk reported a fault the pass fails with every fault
/// collected, ordered by record index. Updates already made are kept.
pub fn run_pass<P, T, E, F>(
    pool: &P,
    chunks: Vec<Chunk<'_, T>>,
    transform: F,
) -> Result<PassReport, PassError>
where
    P: WorkerPool,
    T: Send,
    E: fmt::Display,
    F: Fn(&mut T) -> Result<(), E> + Sync,
{
    dispatch_chunks(pool, chunks, &transform, None)
}

fn dispatch_chunks<P, T, E, F>(
    pool: &P,
    chunks: Vec<Chunk<'_, T>>,
    transform: &F,
    progress: Option<&ProgressBar>,
) -> Result<PassReport, PassError>
where
    P: WorkerPool,
    T: Send,
    E: fmt::Display,
    F: Fn(&mut T) -> Result<(), E> + Sync,
{
    let report = PassReport {
        chunks: chunks.len(),
        records: chunks.iter().map(|c| c.records.len()).sum(),
    };
    if chunks.is_empty() {
        return Ok(report);
    }

    let origins: Vec<(usize, usize)> = chunks.iter().map(|c| (c.index, c.offset)).collect();
    let jobs: Vec<Job<'_, Vec<Fault>>> = chunks
        .into_iter()
        .map(|chunk| Box::new(move || process_chunk(chunk, transform, progress)) as Job<'_, _>)
        .collect();

    let mut faults = Vec::new();
    for ((chunk, offset), outcome) in origins.into_iter().zip(pool.dispatch(jobs)) {
        match outcome {
            Ok(chunk_faults) => faults.extend(chunk_faults),
            Err(panicked) => faults.push(Fault::Panicked {
                chunk,
                index: offset,
                message: panicked.0,
            }),
        }
    }

    if faults.is_empty() {
        debug!("pass complete: {}", report);
        return Ok(report);
    }

    faults.sort_by_key(Fault::index);
    warn!("{} fault(s) across {} chunks", faults.len(), report.chunks);
    Err(PassError::WorkerFault { faults })
}

fn process_chunk<T, E, F>(
    chunk: Chunk<'_, T>,
    transform: &F,
    progress: Option<&ProgressBar>,
) -> Vec<Fault>
where
    E: fmt::Display,
    F: Fn(&mut T) -> Result<(), E>,
{
    let mut faults = Vec::new();

    for (i, record) in chunk.records.iter_mut().enumerate() {
        let index = chunk.offset + i;
        match panic::catch_unwind(AssertUnwindSafe(|| transform(record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => faults.push(Fault::Record {
                chunk: chunk.index,
                index,
                reason: e.to_string(),
            }),
            Err(payload) => faults.push(Fault::Panicked {
                chunk: chunk.index,
                index,
                message: panic_message(&*payload),
            }),
        }
    }

    if let Some(pb) = progress {
        pb.inc(chunk.records.len() as u64);
    }
    faults
}

/// Partition-and-dispatch bundled with the pool it runs on.
pub struct ChunkedUpdater<P> {
    pool: P,
    workers: usize,
    progress: Option<ProgressBar>,
}

impl<P: WorkerPool> ChunkedUpdater<P> {
    pub fn new(pool: P, workers: usize) -> Self {
        Self {
            pool,
            workers,
            progress: None,
        }
    }

    /// Advances `progress` by each chunk's length as the chunk finishes.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn progress(&self) -> Option<&ProgressBar> {
        self.progress.as_ref()
    }

    pub fn update<T, E, F>(&self, records: &mut [T], transform: F) -> Result<PassReport, PassError>
    where
        T: Send,
        E: fmt::Display,
        F: Fn(&mut T) -> Result<(), E> + Sync,
    {
        let chunks = partition(records, self.workers)?;
        dispatch_chunks(&self.pool, chunks, &transform, self.progress.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::InlinePool;

    #[test]
    fn test_chunk_size_over_provisions() {
        assert_eq!(chunk_size(7, 3).unwrap(), 3);
        assert_eq!(chunk_size(9, 3).unwrap(), 4);
        assert_eq!(chunk_size(0, 4).unwrap(), 1);
        assert_eq!(chunk_size(5, 1).unwrap(), 6);
    }

    #[test]
    fn test_chunk_size_saturates_at_max_len() {
        assert_eq!(chunk_size(usize::MAX, 1).unwrap(), usize::MAX);

        assert_eq!(chunk_ranges(usize::MAX, 1).unwrap(), vec![0..usize::MAX]);

        let half = usize::MAX / 2 + 1;
        assert_eq!(
            chunk_ranges(usize::MAX, 2).unwrap(),
            vec![0..half, half..usize::MAX]
        );
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let mut records = vec![1, 2, 3];
        assert!(matches!(
            partition(&mut records, 0),
            Err(PassError::InvalidArgument(_))
        ));
        assert!(matches!(chunk_ranges(3, 0), Err(PassError::InvalidArgument(_))));
    }

    #[test]
    fn test_partition_seven_by_three() {
        let mut records: Vec<i64> = (1..=7).collect();
        let chunks = partition(&mut records, 3).unwrap();

        let sizes: Vec<usize> = chunks.iter().map(|c| c.records.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let ranges: Vec<_> = chunks.iter().map(Chunk::range).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
        assert_eq!(chunk_ranges(7, 3).unwrap(), ranges);
    }

    #[test]
    fn test_partition_empty() {
        let mut records: Vec<i64> = Vec::new();
        assert!(partition(&mut records, 4).unwrap().is_empty());
        assert!(chunk_ranges(0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        for len in 0..64usize {
            for workers in 1..10usize {
                let ranges = chunk_ranges(len, workers).unwrap();
                let covered: Vec<usize> = ranges.iter().cloned().flatten().collect();
                assert_eq!(
                    covered,
                    (0..len).collect::<Vec<_>>(),
                    "len={} workers={}",
                    len,
                    workers
                );
                assert!(ranges.len() <= workers + 1);
                assert!(ranges.iter().all(|r| r.len() <= len / workers + 1));
            }
        }
    }

    #[test]
    fn test_run_pass_empty_never_calls_transform() {
        let mut records: Vec<i64> = Vec::new();
        let chunks = partition(&mut records, 2).unwrap();
        let report = run_pass(&InlinePool, chunks, |_: &mut i64| -> Result<(), String> {
            panic!("transform must not run")
        })
        .unwrap();
        assert_eq!(report, PassReport { chunks: 0, records: 0 });
    }

    #[test]
    fn test_run_pass_collects_every_fault() {
        let mut records: Vec<i64> = (0..10).collect();
        let chunks = partition(&mut records, 3).unwrap();
        let err = run_pass(&InlinePool, chunks, |r: &mut i64| {
            if *r % 4 == 3 {
                return Err(format!("rejected {}", r));
            }
            *r += 100;
            Ok(())
        })
        .unwrap_err();

        let indices: Vec<usize> = err.faults().iter().map(Fault::index).collect();
        assert_eq!(indices, vec![3, 7]);
        assert_eq!(records, vec![100, 101, 102, 3, 104, 105, 106, 7, 108, 109]);
    }
}
