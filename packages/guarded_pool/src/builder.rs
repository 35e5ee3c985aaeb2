use std::mem::size_of;
use std::num::NonZero;

use new_zealand::nz;

use crate::{GuardedPool, HeaderKind, PoolConfig};

/// Slots carved per page unless the caller chooses otherwise.
pub(crate) const DEFAULT_OBJECTS_PER_PAGE: NonZero<usize> = nz!(4);

/// Builder for creating an instance of [`GuardedPool`].
///
/// The object size is mandatory; use either [`object_size()`] for an
/// explicit byte count or [`object_size_of::<T>()`] to take it from a type.
/// Every other setting is optional.
///
/// # Examples
///
/// ```
/// use guarded_pool::{GuardedPool, HeaderKind};
/// use new_zealand::nz;
///
/// // An unlimited pool of 64-byte objects with debug services enabled.
/// let pool = GuardedPool::builder()
///     .object_size(nz!(64))
///     .objects_per_page(nz!(8))
///     .pad_bytes(4)
///     .header(HeaderKind::Basic)
///     .debug(true)
///     .build();
///
/// // Taking the object size from a type.
/// let pool = GuardedPool::builder().object_size_of::<u64>().build();
/// ```
///
/// [`object_size()`]: Self::object_size
/// [`object_size_of::<T>()`]: Self::object_size_of
#[derive(Debug)]
#[must_use]
pub struct GuardedPoolBuilder {
    object_size: Option<NonZero<usize>>,
    objects_per_page: NonZero<usize>,
    max_pages: Option<NonZero<usize>>,
    pad_bytes: usize,
    header: HeaderKind,
    use_system_allocator: bool,
    debug: bool,
}

impl GuardedPoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            object_size: None,
            objects_per_page: DEFAULT_OBJECTS_PER_PAGE,
            max_pages: None,
            pad_bytes: 0,
            header: HeaderKind::None,
            use_system_allocator: false,
            debug: false,
        }
    }

    /// Sets the size in bytes of every object the pool hands out.
    pub fn object_size(mut self, size: NonZero<usize>) -> Self {
        self.object_size = Some(size);
        self
    }

    /// Sets the object size from a type's size.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn object_size_of<T>(mut self) -> Self {
        self.object_size = Some(
            NonZero::new(size_of::<T>()).expect("GuardedPool cannot host zero-sized objects"),
        );
        self
    }

    /// Sets the number of object slots carved out of each page.
    pub fn objects_per_page(mut self, count: NonZero<usize>) -> Self {
        self.objects_per_page = count;
        self
    }

    /// Bounds the number of pages the pool may acquire. Zero means
    /// unlimited, which is also the default.
    pub fn max_pages(mut self, count: usize) -> Self {
        self.max_pages = NonZero::new(count);
        self
    }

    /// Sets the number of guard bytes written on each side of every object.
    ///
    /// Guard bytes are the corruption tripwire: they are imprinted when a
    /// page is created and verified on `free` (debug mode) and by
    /// [`validate_pages()`].
    ///
    /// [`validate_pages()`]: GuardedPool::validate_pages
    pub fn pad_bytes(mut self, count: usize) -> Self {
        self.pad_bytes = count;
        self
    }

    /// Selects the per-slot header variant.
    pub fn header(mut self, kind: HeaderKind) -> Self {
        self.header = kind;
        self
    }

    /// Enables or disables the debug services: double-free, boundary, and
    /// corruption checks, plus the allocated/freed/unallocated pattern
    /// writes. Can be flipped later via [`GuardedPool::set_debug()`].
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Puts the pool in passthrough mode: every allocation goes straight to
    /// the system allocator and no pages are ever carved. Statistics are
    /// still maintained.
    pub fn use_system_allocator(mut self) -> Self {
        self.use_system_allocator = true;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// The first page is acquired lazily by the first allocation, so
    /// construction itself never touches the system allocator.
    ///
    /// # Panics
    ///
    /// Panics if no object size has been set, or if the pool is not in
    /// passthrough mode and the object size is smaller than a pointer (free
    /// objects store the free-list link in their own bytes).
    #[must_use]
    pub fn build(self) -> GuardedPool {
        let object_size = self
            .object_size
            .expect("object size must be set using .object_size() or .object_size_of::<T>() before calling .build()");

        if !self.use_system_allocator {
            assert!(
                object_size.get() >= size_of::<*const u8>(),
                "objects must be at least pointer-sized ({} bytes) to host the free-list link; got {} bytes",
                size_of::<*const u8>(),
                object_size.get(),
            );
        }

        GuardedPool::new_inner(PoolConfig::new(
            object_size,
            self.objects_per_page,
            self.max_pages,
            self.pad_bytes,
            self.header,
            self.use_system_allocator,
            self.debug,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let pool = GuardedPool::builder().object_size(nz!(16)).build();
        let config = pool.config();

        assert_eq!(config.object_size().get(), 16);
        assert_eq!(config.objects_per_page(), DEFAULT_OBJECTS_PER_PAGE);
        assert!(config.max_pages().is_none());
        assert_eq!(config.pad_bytes(), 0);
        assert_eq!(config.header(), HeaderKind::None);
        assert!(!config.uses_system_allocator());
        assert!(!config.debug());
    }

    #[test]
    fn max_pages_zero_means_unlimited() {
        let pool = GuardedPool::builder().object_size(nz!(16)).max_pages(0).build();

        assert!(pool.config().max_pages().is_none());
    }

    #[test]
    #[should_panic]
    fn build_without_object_size_panics() {
        drop(GuardedPool::builder().build());
    }

    #[test]
    #[should_panic]
    fn sub_pointer_object_size_panics() {
        drop(GuardedPool::builder().object_size(nz!(1)).build());
    }

    #[test]
    fn sub_pointer_object_size_is_fine_in_passthrough() {
        let pool = GuardedPool::builder()
            .object_size(nz!(1))
            .use_system_allocator()
            .build();

        assert!(pool.config().uses_system_allocator());
    }

    #[test]
    #[should_panic]
    fn zero_sized_type_panics() {
        drop(GuardedPool::builder().object_size_of::<()>().build());
    }
}
