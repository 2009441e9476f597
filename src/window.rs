//! One-sided memory windows.
//!
//! This module provides [`Window<T>`], a memory region that every rank of a
//! communicator exposes for remote `get`/`put` without a matching call on
//! the target rank.
//!
//! # Synchronization
//!
//! Two capabilities are kept apart on purpose, as separate traits and types:
//!
//! - **Ordering only**: [`OneSided`] `get`/`put` on the window itself,
//!   bounded by [`Window::fence()`]. A fence is a collective epoch boundary:
//!   every operation issued before it has completed before any rank passes
//!   it. Fences order epochs; they do **not** make a read-modify-write
//!   sequence atomic. Two ranks can both `get` the same value, both add one
//!   and both `put`, and one increment is lost.
//! - **Mutual exclusion**: [`Window::accumulate()`] and
//!   [`Window::fetch_and_op()`] are atomic at the target, and
//!   [`Window::lock_exclusive()`] returns an [`ExclusiveGuard`] implementing
//!   [`Exclusive`], which is the only way to run an arbitrary
//!   read-modify-write on a target's region. [`Window::lock_shared()`] gives
//!   read-only access that may overlap with other shared holders.
//!
//! # Feature Gate
//!
//! This module is only available when the `rma` feature is enabled.
//!
//! # Example
//!
//! ```
//! use ferrocomm::{OneSided, ReduceOp, Universe, Window};
//!
//! let counts = Universe::new(3).unwrap().run(|mpi| {
//!     let world = mpi.world();
//!     // Rank 0 exposes a single counter, the others expose nothing.
//!     let local = if world.rank() == 0 { vec![0u64] } else { Vec::new() };
//!     let win = Window::create(&world, local)?;
//!
//!     win.fence()?;
//!     win.accumulate(0, 0, &[1], ReduceOp::Sum)?;
//!     win.fence()?;
//!
//!     let mut counter = [0u64];
//!     win.get(0, 0, &mut counter)?;
//!     win.free()?;
//!     Ok(counter[0])
//! }).unwrap();
//! assert_eq!(counts, vec![3, 3, 3]);
//! ```

use std::ops::Range;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::comm::Communicator;
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::ReduceOp;

/// Ordering-only one-sided access.
///
/// Operations through this trait are complete by the next
/// [`Window::fence()`], but nothing stops other ranks from interleaving
/// their own accesses with them.
pub trait OneSided<T: Datatype> {
    /// Read `buf.len()` elements starting at `disp` from `target`'s region.
    fn get(&self, target: i32, disp: usize, buf: &mut [T]) -> Result<()>;

    /// Write `data` starting at `disp` into `target`'s region.
    fn put(&self, target: i32, disp: usize, data: &[T]) -> Result<()>;
}

/// Mutually-exclusive access to one target's region.
///
/// Only lock guards implement this trait; an ordering-only window handle
/// cannot be used where exclusivity is required.
pub trait Exclusive<T: Datatype> {
    /// The rank whose region is locked.
    fn target(&self) -> i32;

    /// Read `buf.len()` elements starting at `disp`.
    fn read(&self, disp: usize, buf: &mut [T]) -> Result<()>;

    /// Write `data` starting at `disp`.
    fn write(&mut self, disp: usize, data: &[T]) -> Result<()>;

    /// Replace the element at `disp` with `f(old)` and return the old value.
    fn update<F>(&mut self, disp: usize, f: F) -> Result<T>
    where
        F: FnOnce(T) -> T;
}

/// The memory behind a window: one region per rank.
struct WindowMemory<T> {
    regions: Vec<RwLock<Vec<T>>>,
}

impl<T> WindowMemory<T> {
    fn new(size: i32) -> Self {
        WindowMemory {
            regions: (0..size).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }
}

fn span(len: usize, disp: usize, count: usize) -> Result<Range<usize>> {
    match disp.checked_add(count) {
        Some(end) if end <= len => Ok(disp..end),
        _ => Err(Error::InvalidDisplacement { disp, count, len }),
    }
}

fn poisoned<G>(_: G) -> Error {
    Error::Internal("window region lock poisoned".into())
}

/// A memory window exposed by every rank of a communicator.
///
/// Created collectively via [`Window::create()`] or [`Window::allocate()`].
/// The window works on a private duplicate of the communicator, so fences
/// never interfere with the caller's own messages.
///
/// Unlike ordinary rank state, window memory is shared between ranks: it is
/// the only shared resource of a universe.
pub struct Window<T: Datatype> {
    comm: Communicator,
    memory: Arc<WindowMemory<T>>,
}

impl<T: Datatype> Window<T> {
    /// Create a window in which this rank exposes `local`.
    ///
    /// Collective: every rank of `comm` must call it. Ranks may expose
    /// regions of different lengths, including empty ones.
    pub fn create(comm: &Communicator, local: Vec<T>) -> Result<Self> {
        let comm = comm.duplicate()?;
        let context = comm.context();
        let size = comm.size();
        let fabric = comm.endpoint().fabric();
        let memory = fabric.window_memory(context, || WindowMemory::<T>::new(size))?;
        let local_len = local.len();
        *memory.regions[comm.rank() as usize]
            .write()
            .map_err(poisoned)? = local;

        // Everyone has the memory and has published its region.
        comm.barrier()?;
        fabric.release_window_memory(context)?;
        debug!(rank = comm.rank(), context, local_len, "window created");
        Ok(Window { comm, memory })
    }

    /// Create a window in which this rank exposes `local_count` zeroed
    /// elements.
    pub fn allocate(comm: &Communicator, local_count: usize) -> Result<Self> {
        Self::create(comm, vec![T::ZERO; local_count])
    }

    /// Fence synchronization (active target).
    ///
    /// A collective operation that closes the current epoch and opens the
    /// next one. All ranks in the window's communicator must call it.
    pub fn fence(&self) -> Result<()> {
        self.comm.barrier()
    }

    /// Number of processes in the window's communicator.
    pub fn comm_size(&self) -> i32 {
        self.comm.size()
    }

    fn region(&self, target: i32) -> Result<&RwLock<Vec<T>>> {
        self.comm.endpoint().check_rank(target)?;
        Ok(&self.memory.regions[target as usize])
    }

    /// Number of elements `target` exposes.
    pub fn region_len(&self, target: i32) -> Result<usize> {
        Ok(self.region(target)?.read().map_err(poisoned)?.len())
    }

    /// Snapshot of this rank's own region.
    pub fn local(&self) -> Result<Vec<T>> {
        Ok(self
            .region(self.comm.rank())?
            .read()
            .map_err(poisoned)?
            .clone())
    }

    /// Exclusive access to this rank's own region.
    ///
    /// Same as [`lock_exclusive()`](Self::lock_exclusive) on this rank, so
    /// remote accesses to the region wait until the guard is dropped.
    pub fn local_mut(&self) -> Result<ExclusiveGuard<'_, T>> {
        self.lock_exclusive(self.comm.rank())
    }

    /// Combine `data` into `target`'s region element by element.
    ///
    /// Each element update is atomic with respect to every other
    /// accumulate, `fetch_and_op` and lock holder on the same target, so
    /// concurrent accumulates never lose updates.
    pub fn accumulate(&self, target: i32, disp: usize, data: &[T], op: ReduceOp) -> Result<()> {
        let mut region = self.region(target)?.write().map_err(poisoned)?;
        let range = span(region.len(), disp, data.len())?;
        for (slot, value) in region[range].iter_mut().zip(data) {
            *slot = slot.combine(*value, op);
        }
        Ok(())
    }

    /// Atomically combine `value` into one element and return the element's
    /// previous value.
    pub fn fetch_and_op(&self, target: i32, disp: usize, value: T, op: ReduceOp) -> Result<T> {
        let mut region = self.region(target)?.write().map_err(poisoned)?;
        let range = span(region.len(), disp, 1)?;
        let old = region[range.start];
        region[range.start] = old.combine(value, op);
        Ok(old)
    }

    /// Lock `target`'s region for exclusive read-write access.
    ///
    /// Blocks while any other rank holds a lock on the same target. The
    /// lock is released when the guard is dropped or
    /// [`unlock()`](ExclusiveGuard::unlock)ed.
    pub fn lock_exclusive(&self, target: i32) -> Result<ExclusiveGuard<'_, T>> {
        let region = self.region(target)?.write().map_err(poisoned)?;
        Ok(ExclusiveGuard { region, target })
    }

    /// Lock `target`'s region for shared read-only access.
    pub fn lock_shared(&self, target: i32) -> Result<SharedGuard<'_, T>> {
        let region = self.region(target)?.read().map_err(poisoned)?;
        Ok(SharedGuard { region, target })
    }

    /// Free the window.
    ///
    /// Collective: no rank returns before every rank has stopped using the
    /// window.
    pub fn free(self) -> Result<()> {
        self.comm.barrier()?;
        debug!(rank = self.comm.rank(), "window freed");
        Ok(())
    }
}

impl<T: Datatype> OneSided<T> for Window<T> {
    fn get(&self, target: i32, disp: usize, buf: &mut [T]) -> Result<()> {
        let region = self.region(target)?.read().map_err(poisoned)?;
        let range = span(region.len(), disp, buf.len())?;
        buf.copy_from_slice(&region[range]);
        Ok(())
    }

    fn put(&self, target: i32, disp: usize, data: &[T]) -> Result<()> {
        let mut region = self.region(target)?.write().map_err(poisoned)?;
        let range = span(region.len(), disp, data.len())?;
        region[range].copy_from_slice(data);
        Ok(())
    }
}

/// RAII guard for an exclusive lock on one target's region.
///
/// Created by [`Window::lock_exclusive()`].
pub struct ExclusiveGuard<'a, T: Datatype> {
    region: RwLockWriteGuard<'a, Vec<T>>,
    target: i32,
}

impl<T: Datatype> ExclusiveGuard<'_, T> {
    /// Release the lock.
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T: Datatype> Exclusive<T> for ExclusiveGuard<'_, T> {
    fn target(&self) -> i32 {
        self.target
    }

    fn read(&self, disp: usize, buf: &mut [T]) -> Result<()> {
        let range = span(self.region.len(), disp, buf.len())?;
        buf.copy_from_slice(&self.region[range]);
        Ok(())
    }

    fn write(&mut self, disp: usize, data: &[T]) -> Result<()> {
        let range = span(self.region.len(), disp, data.len())?;
        self.region[range].copy_from_slice(data);
        Ok(())
    }

    fn update<F>(&mut self, disp: usize, f: F) -> Result<T>
    where
        F: FnOnce(T) -> T,
    {
        let range = span(self.region.len(), disp, 1)?;
        let old = self.region[range.start];
        self.region[range.start] = f(old);
        Ok(old)
    }
}

/// RAII guard for a shared (read-only) lock on one target's region.
///
/// Created by [`Window::lock_shared()`].
pub struct SharedGuard<'a, T: Datatype> {
    region: RwLockReadGuard<'a, Vec<T>>,
    target: i32,
}

impl<T: Datatype> SharedGuard<'_, T> {
    /// The rank whose region is locked.
    pub fn target(&self) -> i32 {
        self.target
    }

    /// Read `buf.len()` elements starting at `disp`.
    pub fn read(&self, disp: usize, buf: &mut [T]) -> Result<()> {
        let range = span(self.region.len(), disp, buf.len())?;
        buf.copy_from_slice(&self.region[range]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Universe;

    #[test]
    fn span_checks_bounds() {
        assert_eq!(span(4, 1, 3), Ok(1..4));
        assert_eq!(span(0, 0, 0), Ok(0..0));
        assert_eq!(
            span(4, 2, 3),
            Err(Error::InvalidDisplacement {
                disp: 2,
                count: 3,
                len: 4
            })
        );
        assert!(span(4, usize::MAX, 2).is_err());
    }

    #[test]
    fn regions_have_per_rank_lengths() {
        let lens = Universe::new(3)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                let win = Window::<i32>::allocate(&world, world.rank() as usize + 1)?;
                let lens = (0..world.size())
                    .map(|r| win.region_len(r))
                    .collect::<Result<Vec<_>>>()?;
                win.free()?;
                Ok(lens)
            })
            .unwrap();
        for per_rank in lens {
            assert_eq!(per_rank, vec![1, 2, 3]);
        }
    }

    #[test]
    fn put_then_fence_is_visible_everywhere() {
        let seen = Universe::new(3)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                let win = Window::<f64>::allocate(&world, 3)?;
                win.local_mut()?.write(0, &[-1.0; 3])?;
                win.fence()?;
                // Each rank writes its own slot on rank 0.
                win.put(0, world.rank() as usize, &[world.rank() as f64 + 0.5])?;
                win.fence()?;
                let mut all = [0.0; 3];
                win.get(0, 0, &mut all)?;
                win.free()?;
                Ok(all)
            })
            .unwrap();
        for all in seen {
            assert_eq!(all, [0.5, 1.5, 2.5]);
        }
    }

    #[test]
    fn local_is_this_ranks_region() {
        let locals = Universe::new(2)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                let win = Window::create(&world, vec![world.rank(); 2])?;
                let local = win.local()?;
                win.free()?;
                Ok(local)
            })
            .unwrap();
        assert_eq!(locals, vec![vec![0, 0], vec![1, 1]]);
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let results = Universe::new(2).unwrap().launch(|mpi| {
            let world = mpi.world();
            let win = Window::<u8>::allocate(&world, 2)?;
            let mut buf = [0u8; 3];
            assert!(matches!(
                win.get(1, 0, &mut buf),
                Err(Error::InvalidDisplacement { .. })
            ));
            assert_eq!(win.put(2, 0, &[1]), Err(Error::InvalidRank(2)));
            assert!(win.fetch_and_op(0, 2, 1, ReduceOp::Sum).is_err());
            win.free()
        });
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn fetch_and_op_returns_previous_values() {
        let olds = Universe::new(4)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                let local = if world.rank() == 0 { vec![0u32] } else { Vec::new() };
                let win = Window::create(&world, local)?;
                let old = win.fetch_and_op(0, 0, 1, ReduceOp::Sum)?;
                win.fence()?;
                let total = win.lock_shared(0)?;
                let mut value = [0u32];
                total.read(0, &mut value)?;
                drop(total);
                win.free()?;
                Ok((old, value[0]))
            })
            .unwrap();
        let mut previous: Vec<u32> = olds.iter().map(|(old, _)| *old).collect();
        previous.sort_unstable();
        assert_eq!(previous, vec![0, 1, 2, 3]);
        assert!(olds.iter().all(|(_, total)| *total == 4));
    }

    #[test]
    fn exclusive_guard_read_modify_write() {
        let totals = Universe::new(4)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                let win = Window::<i64>::allocate(&world, 1)?;
                for _ in 0..25 {
                    let mut guard = win.lock_exclusive(0)?;
                    assert_eq!(guard.target(), 0);
                    let mut value = [0i64];
                    guard.read(0, &mut value)?;
                    guard.write(0, &[value[0] + 1])?;
                    guard.unlock();
                }
                win.fence()?;
                let total = win.lock_exclusive(0)?.update(0, |v| v)?;
                win.free()?;
                Ok(total)
            })
            .unwrap();
        assert_eq!(totals, vec![100; 4]);
    }
}
