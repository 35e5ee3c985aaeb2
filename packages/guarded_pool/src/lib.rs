//! This crate provides [`GuardedPool`], a fixed-size-block object pool
//! allocator: one pool serves one object size, chosen at construction, and
//! hands out and takes back objects of that size without touching the
//! system allocator on every call.
//!
//! Memory is reserved in pages, each subdivided into a fixed number of
//! equal slots; free slots are threaded together on an intrusive free list
//! that reuses the slots' own bytes, so bookkeeping costs nothing extra.
//! Allocation order is deterministic LIFO.
//!
//! # Debug services
//!
//! Each slot can carry guard bytes and a header block around the object,
//! turning the pool into a memory debugging tool:
//!
//! - **Double-free detection**: freeing an address already on the free
//!   list is rejected.
//! - **Bad-boundary detection**: freeing an address that is not on the
//!   slot grid is rejected.
//! - **Corruption detection**: guard bytes bracketing every object are
//!   imprinted with a known pattern and verified on free and on demand
//!   ([`GuardedPool::validate_pages()`]).
//! - **State patterns**: object regions are filled with distinct
//!   allocated/freed/unallocated patterns on every transition.
//! - **Allocation records**: optional headers number every allocation,
//!   count per-slot reuse, or attach a caller-supplied label
//!   ([`HeaderKind`]).
//!
//! # Example
//!
//! ```
//! use guarded_pool::{GuardedPool, HeaderKind, PoolError};
//! use new_zealand::nz;
//!
//! let mut pool = GuardedPool::builder()
//!     .object_size(nz!(64))
//!     .objects_per_page(nz!(8))
//!     .pad_bytes(4)
//!     .header(HeaderKind::Basic)
//!     .debug(true)
//!     .build();
//!
//! let object = pool.allocate(None)?;
//!
//! // Freeing the same object twice is caught.
//! // SAFETY: The address was loaned out by this pool just above.
//! unsafe {
//!     pool.free(object)?;
//!     assert!(matches!(
//!         pool.free(object),
//!         Err(PoolError::DoubleFree { .. })
//!     ));
//! }
//! # Ok::<(), guarded_pool::PoolError>(())
//! ```
//!
//! # Scope
//!
//! The pool is not a general-purpose allocator: the object size is fixed,
//! there is no internal synchronisation (wrap the pool in a lock to share
//! it), pages are never compacted or coalesced, and alignment is whatever
//! falls out of the slot layout. A passthrough mode forwards every call to
//! the system allocator while keeping the same statistics, which makes
//! before/after comparisons easy.

mod builder;
mod config;
mod error;
mod free_list;
mod header;
mod layout;
mod page;
mod pool;
mod stats;

pub use builder::GuardedPoolBuilder;
pub use config::{
    ALIGN_PATTERN, ALLOCATED_PATTERN, FREED_PATTERN, HeaderKind, PAD_PATTERN, PoolConfig,
    UNALLOCATED_PATTERN,
};
pub use error::PoolError;
pub use header::BlockInfo;
pub use pool::GuardedPool;
pub use stats::PoolStats;
