use std::mem::size_of;
use std::num::NonZero;

/// Byte written across an object region when it is handed to the client
/// (debug mode only).
pub const ALLOCATED_PATTERN: u8 = 0xAA;

/// Byte written across an object region when it is returned to the pool
/// (debug mode only).
pub const FREED_PATTERN: u8 = 0xBB;

/// Byte written across an object region that has never been handed out
/// (debug mode only).
pub const UNALLOCATED_PATTERN: u8 = 0xCC;

/// Byte written into the guard regions bracketing every object. Written at
/// page creation regardless of the debug setting, so pad validation stays
/// meaningful even when the per-operation checks are disabled.
pub const PAD_PATTERN: u8 = 0xDD;

/// Byte reserved for alignment filler. No current layout produces alignment
/// filler, so this pattern is never written.
pub const ALIGN_PATTERN: u8 = 0xEE;

/// Selects the per-slot header that precedes every object's left guard region.
///
/// The header is metadata the pool maintains on the client's behalf; the
/// client must never write to it. Each variant has a fixed size that
/// contributes to the block stride.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum HeaderKind {
    /// No header. Slots carry no per-slot metadata.
    #[default]
    None,

    /// An 8-byte header: three reserved zero bytes, a 4-byte little-endian
    /// allocation number, and a flag byte whose bit 0 means "in use".
    Basic,

    /// A Basic-style header extended with a caller-owned region of
    /// `user_bytes` bytes (zeroed at page creation, never touched again)
    /// and a 2-byte little-endian reuse counter that counts every
    /// allocation made through the slot.
    Extended {
        /// Size of the caller-owned region at the low end of the header.
        user_bytes: usize,
    },

    /// A pointer-sized cell owning a heap-allocated [`BlockInfo`] record
    /// while the slot is in use; zero while the slot is free.
    ///
    /// [`BlockInfo`]: crate::BlockInfo
    External,
}

impl HeaderKind {
    /// The number of bytes this header occupies at the low edge of each slot.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Basic => 8,
            Self::Extended { user_bytes } => user_bytes
                .checked_add(7)
                .expect("extended header size cannot overflow for reasonable user regions"),
            Self::External => size_of::<*const u8>(),
        }
    }
}

/// Immutable configuration of a [`GuardedPool`], fixed at construction.
///
/// The only field that can change afterwards is the debug flag, via
/// [`GuardedPool::set_debug()`].
///
/// [`GuardedPool`]: crate::GuardedPool
/// [`GuardedPool::set_debug()`]: crate::GuardedPool::set_debug
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    object_size: NonZero<usize>,
    objects_per_page: NonZero<usize>,
    max_pages: Option<NonZero<usize>>,
    pad_bytes: usize,
    header: HeaderKind,
    use_system_allocator: bool,
    debug: bool,
}

impl PoolConfig {
    #[must_use]
    pub(crate) fn new(
        object_size: NonZero<usize>,
        objects_per_page: NonZero<usize>,
        max_pages: Option<NonZero<usize>>,
        pad_bytes: usize,
        header: HeaderKind,
        use_system_allocator: bool,
        debug: bool,
    ) -> Self {
        Self {
            object_size,
            objects_per_page,
            max_pages,
            pad_bytes,
            header,
            use_system_allocator,
            debug,
        }
    }

    /// Size in bytes of every object the pool hands out.
    #[must_use]
    #[inline]
    pub fn object_size(&self) -> NonZero<usize> {
        self.object_size
    }

    /// Number of object slots carved out of each page.
    #[must_use]
    #[inline]
    pub fn objects_per_page(&self) -> NonZero<usize> {
        self.objects_per_page
    }

    /// Upper bound on the number of pages, or `None` for unlimited growth.
    #[must_use]
    #[inline]
    pub fn max_pages(&self) -> Option<NonZero<usize>> {
        self.max_pages
    }

    /// Number of guard bytes on each side of every object region.
    #[must_use]
    #[inline]
    pub fn pad_bytes(&self) -> usize {
        self.pad_bytes
    }

    /// The per-slot header variant.
    #[must_use]
    #[inline]
    pub fn header(&self) -> HeaderKind {
        self.header
    }

    /// Whether the pool forwards every allocation to the system allocator
    /// instead of carving pages.
    #[must_use]
    #[inline]
    pub fn uses_system_allocator(&self) -> bool {
        self.use_system_allocator
    }

    /// Whether double-free, boundary, and corruption checks run and the
    /// allocated/freed/unallocated patterns are written.
    #[must_use]
    #[inline]
    pub fn debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn header_sizes() {
        assert_eq!(HeaderKind::None.size(), 0);
        assert_eq!(HeaderKind::Basic.size(), 8);
        assert_eq!(HeaderKind::Extended { user_bytes: 0 }.size(), 7);
        assert_eq!(HeaderKind::Extended { user_bytes: 16 }.size(), 23);
        assert_eq!(HeaderKind::External.size(), size_of::<*const u8>());
    }

    #[test]
    fn pattern_bytes_are_pinned() {
        // These values are part of the on-page format and must never change.
        assert_eq!(ALLOCATED_PATTERN, 0xAA);
        assert_eq!(FREED_PATTERN, 0xBB);
        assert_eq!(UNALLOCATED_PATTERN, 0xCC);
        assert_eq!(PAD_PATTERN, 0xDD);
        assert_eq!(ALIGN_PATTERN, 0xEE);
    }
}
