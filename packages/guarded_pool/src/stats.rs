/// Read-only snapshot of a pool's counters.
///
/// Obtained from [`GuardedPool::stats()`]. The running totals
/// (`allocations`, `deallocations`) are monotonic; `most_objects` records
/// the peak of `objects_in_use` over the pool's lifetime and only grows.
///
/// In passthrough mode only `object_size`, `page_size`, `allocations`,
/// `deallocations`, `objects_in_use`, and `most_objects` are meaningful;
/// the page and free-object counters stay zero.
///
/// [`GuardedPool::stats()`]: crate::GuardedPool::stats
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct PoolStats {
    /// Bytes per object, as configured.
    pub object_size: usize,

    /// Bytes per page, including the page-link cell and all slot overhead.
    pub page_size: usize,

    /// Pages currently owned by the pool.
    pub pages_in_use: usize,

    /// Objects currently loaned out to the client.
    pub objects_in_use: usize,

    /// Objects currently on the free list.
    pub free_objects: usize,

    /// Total allocations ever made.
    pub allocations: usize,

    /// Total deallocations ever made.
    pub deallocations: usize,

    /// Peak of `objects_in_use` over the pool's lifetime.
    pub most_objects: usize,
}
