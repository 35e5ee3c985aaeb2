use thiserror::Error;

/// Failures reported by [`GuardedPool`] operations.
///
/// Every variant carries the context needed to render a useful diagnostic;
/// the pool itself never logs. Detection happens before any state mutation,
/// so a returned error leaves statistics and lists exactly as they were.
///
/// [`GuardedPool`]: crate::GuardedPool
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum PoolError {
    /// The system allocator refused a request for a new page or a
    /// passthrough allocation.
    #[error("no system memory available for {context}")]
    NoMemory {
        /// What the memory was being acquired for.
        context: &'static str,
    },

    /// The free list is empty and the page limit has been reached.
    #[error("out of logical memory: all {max_pages} page(s) are in use")]
    NoPages {
        /// The configured page limit.
        max_pages: usize,
    },

    /// The address handed to `free` is not on a slot boundary within any
    /// page owned by the pool.
    #[error("object at {address:#x} is not on a block boundary")]
    BadBoundary {
        /// The offending address.
        address: usize,
    },

    /// The address handed to `free` is already on the free list.
    #[error("object at {address:#x} has already been freed")]
    DoubleFree {
        /// The offending address.
        address: usize,
    },

    /// A guard byte bracketing the object no longer holds the pad pattern.
    #[error("pad bytes bracketing the object at {address:#x} have been overwritten")]
    Corruption {
        /// Address of the object whose pads were damaged.
        address: usize,
    },
}
