use std::alloc::{Layout, alloc, dealloc};
use std::ptr::{self, NonNull};

use crate::config::{ALLOCATED_PATTERN, FREED_PATTERN};
use crate::free_list::FreeList;
use crate::header;
use crate::layout::BlockLayout;
use crate::page::{self, Page};
use crate::{GuardedPoolBuilder, HeaderKind, PoolConfig, PoolError, PoolStats};

/// A fixed-size-block object pool allocator with optional debug services.
///
/// One pool serves one object size, chosen at construction. The pool
/// amortises system-allocator cost by reserving memory in pages, each
/// subdivided into a fixed number of equal slots threaded onto an intrusive
/// free list. Allocation pops the free-list head; freeing pushes the object
/// back, so reuse order is deterministic LIFO.
///
/// # Debug services
///
/// With guard bytes and debug mode configured, the pool detects double
/// frees, frees of addresses that are not on a slot boundary, and client
/// writes through the guard regions, reporting each as a distinct
/// [`PoolError`]. Object regions are imprinted with recognisable patterns
/// on every state transition so stale pointers are easy to spot in a
/// debugger. Optional per-slot headers record allocation numbers, reuse
/// counts, and caller-supplied labels.
///
/// # Passthrough mode
///
/// A pool built with
/// [`use_system_allocator()`](GuardedPoolBuilder::use_system_allocator)
/// forwards every allocation to the system allocator while still
/// maintaining usage statistics. No pages are carved, and the debug
/// services do not apply.
///
/// # Ownership
///
/// Objects handed out by [`allocate()`](Self::allocate) are loaned: the
/// client owns the bytes until the matching [`free()`](Self::free) returns,
/// after which the pool resumes exclusive ownership. The client must never
/// touch a freed object, nor the header and guard bytes at any time. Pages
/// are only released when the pool is dropped.
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe: it holds no
/// locks and must be wrapped in external synchronisation to be shared.
///
/// # Example
///
/// ```
/// use guarded_pool::GuardedPool;
/// use new_zealand::nz;
///
/// let mut pool = GuardedPool::builder()
///     .object_size(nz!(32))
///     .objects_per_page(nz!(4))
///     .debug(true)
///     .build();
///
/// let object = pool.allocate(None)?;
/// assert_eq!(pool.stats().objects_in_use, 1);
///
/// // SAFETY: The address was just loaned out by this pool.
/// unsafe {
///     pool.free(object)?;
/// }
/// assert_eq!(pool.stats().objects_in_use, 0);
/// # Ok::<(), guarded_pool::PoolError>(())
/// ```
#[derive(Debug)]
pub struct GuardedPool {
    config: PoolConfig,
    layout: BlockLayout,

    /// Strategy chosen once at construction; every operation dispatches on
    /// this instead of re-consulting the configuration.
    backing: Backing,

    /// Pages in acquisition order; the last element is the page-list head.
    pages: Vec<Page>,

    free_list: FreeList,
    stats: PoolStats,
}

/// How the pool obtains object memory.
#[derive(Clone, Copy, Debug)]
enum Backing {
    /// Objects are carved from pool-owned pages.
    Paged,

    /// Every allocation is forwarded to the system allocator.
    System,
}

impl GuardedPool {
    /// Creates a builder for configuring and constructing a [`GuardedPool`].
    ///
    /// You must specify an object size using either `.object_size()` or
    /// `.object_size_of::<T>()` before calling `.build()`.
    #[inline]
    pub fn builder() -> GuardedPoolBuilder {
        GuardedPoolBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(config: PoolConfig) -> Self {
        let layout = BlockLayout::new(&config);

        let backing = if config.uses_system_allocator() {
            Backing::System
        } else {
            Backing::Paged
        };

        let stats = PoolStats {
            object_size: layout.object_size(),
            page_size: layout.page_bytes(),
            ..PoolStats::default()
        };

        Self {
            config,
            layout,
            backing,
            pages: Vec::new(),
            free_list: FreeList::new(),
            stats,
        }
    }

    /// Allocates one object and returns its address.
    ///
    /// The returned region is `object_size` bytes; in debug mode it is
    /// filled with the allocated pattern. `label` is recorded in the slot's
    /// record when the External header variant is configured and ignored
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoPages`] when the free list is empty and the page
    /// limit has been reached; [`PoolError::NoMemory`] when the system
    /// allocator refuses a new page (or, in passthrough mode, the
    /// allocation itself).
    ///
    /// # Example
    ///
    /// ```
    /// use guarded_pool::GuardedPool;
    /// use new_zealand::nz;
    ///
    /// let mut pool = GuardedPool::builder()
    ///     .object_size(nz!(16))
    ///     .objects_per_page(nz!(2))
    ///     .max_pages(1)
    ///     .build();
    ///
    /// let first = pool.allocate(None)?;
    /// let second = pool.allocate(None)?;
    ///
    /// // Both slots of the single permitted page are now loaned out.
    /// assert!(pool.allocate(None).is_err());
    /// # unsafe { pool.free(first)?; pool.free(second)?; }
    /// # Ok::<(), guarded_pool::PoolError>(())
    /// ```
    pub fn allocate(&mut self, label: Option<&str>) -> Result<NonNull<u8>, PoolError> {
        match self.backing {
            Backing::Paged => self.allocate_paged(label),
            Backing::System => self.allocate_system(),
        }
    }

    /// Returns a previously allocated object to the pool.
    ///
    /// In debug mode the address is vetted first: an address already on the
    /// free list, an address outside every page, an address off the slot
    /// grid, and damaged guard bytes are each rejected with the matching
    /// error before any state changes. The object region is then poisoned
    /// with the freed pattern and pushed onto the free list.
    ///
    /// # Errors
    ///
    /// In debug mode: [`PoolError::DoubleFree`], [`PoolError::BadBoundary`],
    /// or [`PoolError::Corruption`]. With debug mode disabled no vetting
    /// occurs and the call always succeeds.
    ///
    /// # Safety
    ///
    /// `object` must have been returned by [`allocate()`](Self::allocate)
    /// on this same pool and not freed since. With debug mode enabled,
    /// violations of this contract on a paged pool are detected and
    /// reported as errors instead of invoking undefined behavior.
    pub unsafe fn free(&mut self, object: NonNull<u8>) -> Result<(), PoolError> {
        match self.backing {
            // SAFETY: Forwarding the caller's contract.
            Backing::Paged => unsafe { self.free_paged(object) },
            Backing::System => {
                // SAFETY: Forwarding the caller's contract.
                unsafe {
                    self.free_system(object);
                }
                Ok(())
            }
        }
    }

    /// Invokes `callback` with the address and size of every object
    /// currently loaned out, in page-list order and ascending address order
    /// within each page. Returns the number of objects in use.
    ///
    /// Returns 0 without invoking the callback in passthrough mode.
    pub fn dump_memory_in_use(&self, mut callback: impl FnMut(NonNull<u8>, usize)) -> usize {
        if matches!(self.backing, Backing::System) {
            return 0;
        }

        for page in self.pages.iter().rev() {
            for object in page.objects() {
                if !self.free_list.contains(object) {
                    callback(object, self.layout.object_size());
                }
            }
        }

        self.stats.objects_in_use
    }

    /// Invokes `callback` with the address and size of every slot whose
    /// guard bytes have been damaged, whether the slot is in use or free,
    /// in page-list order and ascending address order within each page.
    /// Returns the number of damaged slots.
    ///
    /// Returns 0 when no guard bytes are configured, and in passthrough
    /// mode.
    pub fn validate_pages(&self, mut callback: impl FnMut(NonNull<u8>, usize)) -> usize {
        if matches!(self.backing, Backing::System) {
            return 0;
        }

        let mut corrupted = 0;

        for page in self.pages.iter().rev() {
            for object in page.objects() {
                // SAFETY: The object address comes from this pool's own
                // page walk, so both guard regions are readable.
                if !unsafe { page::pads_intact(&self.layout, object) } {
                    corrupted += 1;
                    callback(object, self.layout.object_size());
                }
            }
        }

        corrupted
    }

    /// Releases pages that contain no loaned-out objects.
    ///
    /// Page reclamation is not implemented; this always reports zero pages
    /// freed. See [`can_free_empty_pages()`](Self::can_free_empty_pages).
    pub fn free_empty_pages(&mut self) -> usize {
        0
    }

    /// Whether this pool can release empty pages back to the system
    /// allocator before it is dropped. Always `false`; pages live until the
    /// pool does.
    #[must_use]
    pub fn can_free_empty_pages(&self) -> bool {
        false
    }

    /// Enables or disables the debug services. All other configuration is
    /// immutable after construction.
    pub fn set_debug(&mut self, enabled: bool) {
        self.config.set_debug(enabled);
    }

    /// The pool's configuration.
    #[must_use]
    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// A snapshot of the pool's counters.
    #[must_use]
    #[inline]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// The number of objects currently loaned out.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Equivalent mutations only shift which counter is read.
    #[inline]
    pub fn len(&self) -> usize {
        self.stats.objects_in_use
    }

    /// Whether no objects are currently loaned out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.objects_in_use == 0
    }

    /// Address of the most recently freed (or never-allocated) object that
    /// the next allocation will return, if any. Exposed for test
    /// introspection.
    #[must_use]
    pub fn free_list_head(&self) -> Option<NonNull<u8>> {
        self.free_list.head()
    }

    /// Base address of the most recently acquired page, if any. Exposed
    /// for test introspection.
    #[must_use]
    pub fn page_list_head(&self) -> Option<NonNull<u8>> {
        self.pages.last().map(Page::base)
    }

    fn allocate_paged(&mut self, label: Option<&str>) -> Result<NonNull<u8>, PoolError> {
        if self.stats.free_objects == 0 {
            self.acquire_page()?;
        }

        let object = self
            .free_list
            .pop_front()
            .expect("free list cannot be empty: a page acquisition just refilled it");

        self.stats.allocations += 1;
        self.stats.free_objects -= 1;
        self.stats.objects_in_use += 1;
        self.stats.most_objects = self.stats.most_objects.max(self.stats.objects_in_use);

        // SAFETY: The address came off the free list, so it is a slot
        // object address in one of our live pages, carved with our header
        // variant. Counters were updated first so the header records the
        // 1-based allocation number.
        unsafe {
            header::mark_allocated(
                self.config.header(),
                &self.layout,
                object,
                allocation_number(self.stats.allocations),
                label,
            );
        }

        if self.config.debug() {
            // SAFETY: The object region is object_size writable bytes
            // inside a live page. The guard regions are not touched.
            unsafe {
                ptr::write_bytes(object.as_ptr(), ALLOCATED_PATTERN, self.layout.object_size());
            }
        }

        Ok(object)
    }

    fn acquire_page(&mut self) -> Result<(), PoolError> {
        if let Some(max_pages) = self.config.max_pages() {
            if self.stats.pages_in_use >= max_pages.get() {
                return Err(PoolError::NoPages {
                    max_pages: max_pages.get(),
                });
            }
        }

        let previous_head = self
            .pages
            .last()
            .map_or(ptr::null_mut(), |page| page.base().as_ptr());

        let page = Page::acquire(
            self.layout,
            previous_head,
            self.config.debug(),
            &mut self.free_list,
        )?;

        self.pages.push(page);
        self.stats.pages_in_use += 1;
        self.stats.free_objects += self.layout.objects_per_page();

        Ok(())
    }

    /// # Safety
    ///
    /// `object` must be a live loan from this pool (vetted here when debug
    /// mode is on).
    unsafe fn free_paged(&mut self, object: NonNull<u8>) -> Result<(), PoolError> {
        if self.config.debug() {
            let address = object.as_ptr() as usize;

            if self.free_list.contains(object) {
                return Err(PoolError::DoubleFree { address });
            }

            let Some(owner) = self.pages.iter().rev().find(|page| page.contains(object)) else {
                return Err(PoolError::BadBoundary { address });
            };

            let offset = address - owner.base().as_ptr() as usize;
            let first = self.layout.first_object_offset();
            if offset < first || (offset - first) % self.layout.block_stride() != 0 {
                return Err(PoolError::BadBoundary { address });
            }

            if self.layout.pad_bytes() > 0 {
                // SAFETY: The address was just verified to sit on the slot
                // grid of a live page, so both guard regions are readable.
                if !unsafe { page::pads_intact(&self.layout, object) } {
                    return Err(PoolError::Corruption { address });
                }
            }
        }

        // SAFETY: Per the caller's contract (verified above in debug mode)
        // this is a loaned-out slot of ours. The external record is
        // released here, while the object bytes are still the client's.
        unsafe {
            header::mark_freed(self.config.header(), &self.layout, object);
        }

        if self.config.debug() {
            // SAFETY: The object region is object_size writable bytes
            // inside a live page.
            unsafe {
                ptr::write_bytes(object.as_ptr(), FREED_PATTERN, self.layout.object_size());
            }
        }

        // SAFETY: The slot is at least pointer-sized, lives until the pool
        // drops its pages, and is not already on the list.
        unsafe {
            self.free_list.push_front(object);
        }

        self.stats.free_objects += 1;
        self.stats.deallocations += 1;
        self.stats.objects_in_use = self
            .stats
            .objects_in_use
            .checked_sub(1)
            .expect("free cannot outnumber allocate for vetted objects");

        Ok(())
    }

    fn allocate_system(&mut self) -> Result<NonNull<u8>, PoolError> {
        self.stats.allocations += 1;
        self.stats.objects_in_use += 1;
        self.stats.most_objects = self.stats.most_objects.max(self.stats.objects_in_use);

        // SAFETY: The layout has non-zero size.
        let Some(object) = NonNull::new(unsafe { alloc(self.system_layout()) }) else {
            return Err(PoolError::NoMemory {
                context: "passthrough allocation",
            });
        };

        Ok(object)
    }

    /// # Safety
    ///
    /// `object` must be a live passthrough allocation from this pool.
    unsafe fn free_system(&mut self, object: NonNull<u8>) {
        self.stats.deallocations += 1;
        self.stats.objects_in_use = self
            .stats
            .objects_in_use
            .checked_sub(1)
            .expect("free cannot outnumber allocate in passthrough mode");

        // SAFETY: The caller guarantees the address came from
        // allocate_system(), which used this same layout.
        unsafe {
            dealloc(object.as_ptr(), self.system_layout());
        }
    }

    fn system_layout(&self) -> Layout {
        Layout::from_size_align(self.layout.object_size(), 1)
            .expect("passthrough layout is valid: non-zero size, alignment of one")
    }
}

impl Drop for GuardedPool {
    fn drop(&mut self) {
        // External header records are owned through raw cells, so they are
        // the one resource the page deallocations below cannot release.
        // One dedicated walk frees the record of every in-use slot.
        if matches!(self.config.header(), HeaderKind::External) {
            for page in self.pages.iter().rev() {
                for object in page.objects() {
                    if !self.free_list.contains(object) {
                        // SAFETY: The slot is in use, so its cell holds
                        // either a live record from mark_allocated() or
                        // null (never the case for vetted loans).
                        unsafe {
                            header::mark_freed(HeaderKind::External, &self.layout, object);
                        }
                    }
                }
            }
        }

        // Pages release their memory when the Vec drops.
    }
}

// SAFETY: The pool owns its pages, free-list nodes, and external records
// outright; the raw pointers are ownership handles into that owned memory,
// never shared with other threads by the pool itself.
unsafe impl Send for GuardedPool {}

/// Allocation numbers are recorded modulo 2^32, the width of the header
/// field.
#[expect(
    clippy::cast_possible_truncation,
    reason = "wrapping at u32::MAX is the header field's defined behavior"
)]
fn allocation_number(allocations: usize) -> u32 {
    allocations as u32
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn smoke_test() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(16))
            .objects_per_page(nz!(4))
            .debug(true)
            .build();

        assert!(pool.is_empty());
        assert!(pool.page_list_head().is_none());

        let a = pool.allocate(None).unwrap();
        let b = pool.allocate(None).unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().pages_in_use, 1);
        assert_eq!(pool.stats().free_objects, 2);

        unsafe {
            pool.free(a).unwrap();
            pool.free(b).unwrap();
        }

        assert!(pool.is_empty());
        assert_eq!(pool.stats().deallocations, 2);
    }

    #[test]
    fn first_page_is_created_by_first_allocate() {
        let mut pool = GuardedPool::builder().object_size(nz!(8)).build();

        assert_eq!(pool.stats().pages_in_use, 0);
        assert_eq!(pool.stats().free_objects, 0);

        let object = pool.allocate(None).unwrap();

        assert_eq!(pool.stats().pages_in_use, 1);
        unsafe {
            pool.free(object).unwrap();
        }
    }

    #[test]
    fn reuse_is_lifo() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .objects_per_page(nz!(4))
            .build();

        let a = pool.allocate(None).unwrap();
        unsafe {
            pool.free(a).unwrap();
        }

        let again = pool.allocate(None).unwrap();
        assert_eq!(again, a);
        unsafe {
            pool.free(again).unwrap();
        }
    }

    #[test]
    fn page_limit_is_enforced() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .objects_per_page(nz!(2))
            .max_pages(1)
            .build();

        let _a = pool.allocate(None).unwrap();
        let _b = pool.allocate(None).unwrap();

        assert_eq!(
            pool.allocate(None),
            Err(PoolError::NoPages { max_pages: 1 })
        );

        // The failed allocation left the counters untouched.
        assert_eq!(pool.stats().allocations, 2);
        assert_eq!(pool.stats().objects_in_use, 2);
    }

    #[test]
    fn double_free_is_detected() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .debug(true)
            .build();

        let object = pool.allocate(None).unwrap();
        unsafe {
            pool.free(object).unwrap();

            assert_eq!(
                pool.free(object),
                Err(PoolError::DoubleFree {
                    address: object.as_ptr() as usize
                })
            );
        }

        // The rejected free mutated nothing.
        assert_eq!(pool.stats().deallocations, 1);
        assert_eq!(pool.stats().free_objects, pool.config().objects_per_page().get());
    }

    #[test]
    fn off_grid_address_is_rejected() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .debug(true)
            .build();

        let object = pool.allocate(None).unwrap();
        let inside = unsafe { object.byte_add(1) };

        unsafe {
            assert_eq!(
                pool.free(inside),
                Err(PoolError::BadBoundary {
                    address: inside.as_ptr() as usize
                })
            );

            // The object itself is still live and freeable.
            pool.free(object).unwrap();
        }
    }

    #[test]
    fn foreign_address_is_rejected() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .debug(true)
            .build();

        let _object = pool.allocate(None).unwrap();

        let mut foreign = 0_u64;
        let foreign = NonNull::from(&mut foreign).cast::<u8>();

        unsafe {
            assert_eq!(
                pool.free(foreign),
                Err(PoolError::BadBoundary {
                    address: foreign.as_ptr() as usize
                })
            );
        }
    }

    #[test]
    fn damaged_pads_are_detected_on_free() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .pad_bytes(4)
            .debug(true)
            .build();

        let object = pool.allocate(None).unwrap();

        unsafe {
            // Overrun: clobber the first byte of the right pad.
            object.as_ptr().add(8).write(0x00);

            assert_eq!(
                pool.free(object),
                Err(PoolError::Corruption {
                    address: object.as_ptr() as usize
                })
            );
        }
    }

    #[test]
    fn patterns_mark_object_state() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(16))
            .objects_per_page(nz!(2))
            .debug(true)
            .build();

        let object = pool.allocate(None).unwrap();

        unsafe {
            for offset in 0..16 {
                assert_eq!(object.as_ptr().add(offset).read(), ALLOCATED_PATTERN);
            }

            pool.free(object).unwrap();

            // The freed pattern covers the object except for the link cell
            // written when the slot rejoined the free list.
            for offset in size_of::<*const u8>()..16 {
                assert_eq!(object.as_ptr().add(offset).read(), FREED_PATTERN);
            }
        }
    }

    #[test]
    fn most_objects_tracks_peak_in_use() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .objects_per_page(nz!(4))
            .build();

        let a = pool.allocate(None).unwrap();
        let b = pool.allocate(None).unwrap();
        assert_eq!(pool.stats().most_objects, 2);

        unsafe {
            pool.free(a).unwrap();
            pool.free(b).unwrap();
        }
        assert_eq!(pool.stats().most_objects, 2);

        // Climbing back to the old peak does not move it; exceeding it does.
        let _c = pool.allocate(None).unwrap();
        let _d = pool.allocate(None).unwrap();
        assert_eq!(pool.stats().most_objects, 2);

        let _e = pool.allocate(None).unwrap();
        assert_eq!(pool.stats().most_objects, 3);
    }

    #[test]
    fn passthrough_maintains_stats_without_pages() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(24))
            .use_system_allocator()
            .build();

        let object = pool.allocate(None).unwrap();

        assert_eq!(pool.stats().pages_in_use, 0);
        assert_eq!(pool.stats().free_objects, 0);
        assert_eq!(pool.stats().allocations, 1);
        assert_eq!(pool.stats().objects_in_use, 1);
        assert_eq!(pool.stats().most_objects, 1);
        assert!(pool.page_list_head().is_none());

        assert_eq!(pool.dump_memory_in_use(|_, _| panic!("no pages to dump")), 0);
        assert_eq!(pool.validate_pages(|_, _| panic!("no pages to validate")), 0);

        unsafe {
            pool.free(object).unwrap();
        }
        assert_eq!(pool.stats().deallocations, 1);
        assert_eq!(pool.stats().objects_in_use, 0);
    }

    #[test]
    fn dump_reports_only_loaned_objects() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .objects_per_page(nz!(4))
            .build();

        let a = pool.allocate(None).unwrap();
        let b = pool.allocate(None).unwrap();
        let c = pool.allocate(None).unwrap();
        unsafe {
            pool.free(b).unwrap();
        }

        let mut reported = Vec::new();
        let in_use = pool.dump_memory_in_use(|object, size| {
            assert_eq!(size, 8);
            reported.push(object);
        });

        assert_eq!(in_use, 2);
        assert!(reported.contains(&a));
        assert!(!reported.contains(&b));
        assert!(reported.contains(&c));
    }

    #[test]
    fn dump_reports_slots_in_ascending_order_within_a_page() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .objects_per_page(nz!(4))
            .build();

        for _ in 0..4 {
            let _ = pool.allocate(None).unwrap();
        }

        let mut addresses = Vec::new();
        pool.dump_memory_in_use(|object, _| addresses.push(object.as_ptr() as usize));

        let mut sorted = addresses.clone();
        sorted.sort_unstable();
        assert_eq!(addresses, sorted);
    }

    #[test]
    fn validate_finds_damage_in_free_and_loaned_slots() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(8))
            .objects_per_page(nz!(4))
            .pad_bytes(2)
            .build();

        let loaned = pool.allocate(None).unwrap();
        let freed = pool.allocate(None).unwrap();
        unsafe {
            pool.free(freed).unwrap();

            // Damage one pad byte of each.
            loaned.as_ptr().sub(1).write(0x11);
            freed.as_ptr().add(8).write(0x22);
        }

        let mut reported = Vec::new();
        let corrupted = pool.validate_pages(|object, _| reported.push(object));

        assert_eq!(corrupted, 2);
        assert!(reported.contains(&loaned));
        assert!(reported.contains(&freed));
    }

    #[test]
    fn validate_without_pads_reports_nothing() {
        let mut pool = GuardedPool::builder().object_size(nz!(8)).build();

        let _object = pool.allocate(None).unwrap();

        assert_eq!(pool.validate_pages(|_, _| panic!("no pads to damage")), 0);
    }

    #[test]
    fn page_reclamation_is_stubbed() {
        let mut pool = GuardedPool::builder().object_size(nz!(8)).build();

        assert_eq!(pool.free_empty_pages(), 0);
        assert!(!pool.can_free_empty_pages());
    }

    #[test]
    fn set_debug_takes_effect_for_later_calls() {
        let mut pool = GuardedPool::builder().object_size(nz!(8)).build();

        let object = pool.allocate(None).unwrap();
        unsafe {
            pool.free(object).unwrap();
        }

        // With debug off, the double free above went unnoticed; now it is
        // caught.
        pool.set_debug(true);
        unsafe {
            assert_eq!(
                pool.free(object),
                Err(PoolError::DoubleFree {
                    address: object.as_ptr() as usize
                })
            );
        }
    }

    #[test]
    fn dropping_with_external_records_releases_them() {
        let mut pool = GuardedPool::builder()
            .object_size(nz!(16))
            .objects_per_page(nz!(2))
            .header(HeaderKind::External)
            .build();

        // One slot in use with a label, one freed, one in use without.
        let _kept = pool.allocate(Some("kept")).unwrap();
        let released = pool.allocate(None).unwrap();
        unsafe {
            pool.free(released).unwrap();
        }
        let _bare = pool.allocate(None).unwrap();

        // Dropping the pool must release both live records (checked by
        // leak detection under Miri or sanitizers).
        drop(pool);
    }
}
