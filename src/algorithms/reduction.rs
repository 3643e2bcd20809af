use std::sync::{Arc, Barrier, Mutex};

use crate::errors::GridError;
use crate::storage::GridStorage;

///
/// A group of cooperating workers able to all-reduce a buffer: after `sum` returns,
/// every worker holds the element-wise sum of the buffers all workers passed in.
///
pub trait Communicator
{
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn sum(&self, buffer: &mut [f64]) -> Result<(), GridError>;
}

/// A group of one. Summing is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator
{
    fn rank(&self) -> usize
    {
        0
    }
    fn size(&self) -> usize
    {
        1
    }
    fn sum(&self, _buffer: &mut [f64]) -> Result<(), GridError>
    {
        Ok(())
    }
}

#[derive(Debug)]
struct Shared
{
    barrier: Barrier,
    accumulator: Mutex<Vec<f64>>,
    failed: Mutex<bool>,
}

impl Shared
{
    fn mark_failed(&self)
    {
        // a poisoned flag already reads as failed
        if let Ok(mut failed) = self.failed.lock()
        {
            *failed = true;
        }
    }
}

///
/// In-process group of `size` threads joined by a barrier. Every member must call
/// `sum` with a buffer of the same length; each call passes the barrier three times.
///
#[derive(Clone, Debug)]
pub struct ThreadCommunicator
{
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadCommunicator
{
    /// One handle per member of a new group; hand one to each thread.
    pub fn group(size: usize) -> Vec<Self>
    {
        let shared = Arc::new(Shared { barrier: Barrier::new(size), accumulator: Mutex::new(Vec::new()), failed: Mutex::new(false) });
        (0..size).map(|rank| Self { rank, size, shared: Arc::clone(&shared) }).collect()
    }
}

impl Communicator for ThreadCommunicator
{
    fn rank(&self) -> usize
    {
        self.rank
    }

    fn size(&self) -> usize
    {
        self.size
    }

    fn sum(&self, buffer: &mut [f64]) -> Result<(), GridError>
    {
        // every member passes all three barriers, failed or not
        let shared = &self.shared;
        if self.rank == 0
        {
            let reset = shared.accumulator.lock().map(|mut accumulator|
            {
                accumulator.clear();
                accumulator.resize(buffer.len(), 0.0);
            }).is_ok();
            if let Ok(mut failed) = shared.failed.lock()
            {
                *failed = !reset;
            }
        }
        shared.barrier.wait();
        let added = shared.accumulator.lock().map(|mut accumulator|
        {
            let fits = accumulator.len() == buffer.len();
            if fits
            {
                accumulator.iter_mut().zip(buffer.iter()).for_each(|(a, &b)| *a += b);
            }
            fits
        }).unwrap_or(false);
        if !added
        {
            shared.mark_failed();
        }
        shared.barrier.wait();
        let mut failed = shared.failed.lock().map(|failed| *failed).unwrap_or(true);
        if !failed
        {
            match shared.accumulator.lock()
            {
                Ok(accumulator) => buffer.copy_from_slice(&accumulator),
                Err(_) => failed = true,
            }
        }
        // nobody may reset the accumulator before every member has read it
        shared.barrier.wait();
        if failed
        {
            return Err(GridError::CommunicationFailed);
        }
        Ok(())
    }
}

///
/// Sum the value buffer, then the derivative buffer, of `storage` over `comm`.
/// Workers first agree that their buffer lengths match rank 0's; on a mismatch every
/// worker fails with both buffers untouched. A communicator failure during the
/// derivative sum leaves the values already reduced.
///
pub fn all_reduce<S: GridStorage, C: Communicator + ?Sized>(storage: &mut S, comm: &C) -> Result<(), GridError>
{
    let (values, derivatives) = storage.flat_buffers_mut().ok_or(GridError::NotReducible)?;
    let lengths = [values.len() as f64, derivatives.len() as f64];
    let mut reference = if comm.rank() == 0 { lengths } else { [0.0; 2] };
    comm.sum(&mut reference)?;
    let mut mismatched = [if reference == lengths { 0.0 } else { 1.0 }];
    comm.sum(&mut mismatched)?;
    if mismatched[0] != 0.0
    {
        log::warn!("worker {} cannot reduce: buffer lengths differ across workers", comm.rank());
        return Err(GridError::CommunicationFailed);
    }
    comm.sum(values)?;
    comm.sum(derivatives)?;
    log::debug!("reduced {} values across {} workers", values.len(), comm.size());
    Ok(())
}
