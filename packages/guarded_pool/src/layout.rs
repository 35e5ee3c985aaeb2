use std::alloc::Layout;
use std::mem::{align_of, size_of};

use crate::PoolConfig;

/// Size of the page-link cell at the head of every page.
pub(crate) const PAGE_LINK_BYTES: usize = size_of::<*const u8>();

/// Precalculated byte geometry of a pool's pages and slots.
///
/// Every offset in the crate comes from here; no call site recomputes header
/// arithmetic on its own. A slot is laid out low to high as
/// `[header][left pad][object][right pad]`, and a page as
/// `[page-link cell][slot 0]..[slot n-1]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BlockLayout {
    object_size: usize,
    objects_per_page: usize,
    pad_bytes: usize,
    header_size: usize,
    block_stride: usize,
    page_bytes: usize,
}

impl BlockLayout {
    /// Derives the block stride and page size from the pool configuration.
    ///
    /// # Panics
    ///
    /// Panics if the combined sizes overflow `usize`. Such a configuration
    /// could not be backed by real memory anyway.
    #[must_use]
    pub(crate) fn new(config: &PoolConfig) -> Self {
        let object_size = config.object_size().get();
        let objects_per_page = config.objects_per_page().get();
        let pad_bytes = config.pad_bytes();
        let header_size = config.header().size();

        let block_stride = header_size
            .checked_add(
                pad_bytes
                    .checked_mul(2)
                    .expect("pad byte count cannot overflow"),
            )
            .and_then(|overhead| overhead.checked_add(object_size))
            .expect("block stride calculation cannot overflow for reasonable configurations");

        let page_bytes = block_stride
            .checked_mul(objects_per_page)
            .and_then(|slots| slots.checked_add(PAGE_LINK_BYTES))
            .expect("page size calculation cannot overflow for reasonable configurations");

        Self {
            object_size,
            objects_per_page,
            pad_bytes,
            header_size,
            block_stride,
            page_bytes,
        }
    }

    #[must_use]
    pub(crate) fn object_size(&self) -> usize {
        self.object_size
    }

    #[must_use]
    pub(crate) fn objects_per_page(&self) -> usize {
        self.objects_per_page
    }

    #[must_use]
    pub(crate) fn pad_bytes(&self) -> usize {
        self.pad_bytes
    }

    #[must_use]
    pub(crate) fn header_size(&self) -> usize {
        self.header_size
    }

    /// Distance between the same position in consecutive slots.
    #[must_use]
    pub(crate) fn block_stride(&self) -> usize {
        self.block_stride
    }

    /// Total bytes acquired from the system allocator per page.
    #[must_use]
    pub(crate) fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Offset from the page base to the first slot's object region.
    #[must_use]
    pub(crate) fn first_object_offset(&self) -> usize {
        PAGE_LINK_BYTES + self.header_size + self.pad_bytes
    }

    /// Backward distance from an object address to its slot's flag byte
    /// (Basic and Extended headers).
    #[must_use]
    pub(crate) fn flag_back_offset(&self) -> usize {
        self.pad_bytes + 1
    }

    /// Backward distance from an object address to the low byte of its
    /// slot's 4-byte allocation number (Basic and Extended headers).
    #[must_use]
    pub(crate) fn allocation_number_back_offset(&self) -> usize {
        self.pad_bytes + 5
    }

    /// Backward distance from an object address to the low byte of its
    /// slot's 2-byte reuse counter (Extended headers only).
    #[must_use]
    pub(crate) fn reuse_counter_back_offset(&self) -> usize {
        self.pad_bytes + 7
    }

    /// Backward distance from an object address to the start of its header
    /// region. For External headers this is the pointer-sized record cell.
    #[must_use]
    pub(crate) fn header_back_offset(&self) -> usize {
        self.pad_bytes + self.header_size
    }

    /// Allocation layout of one page. Pages are pointer-aligned so the
    /// page-link cell at offset zero can be accessed directly.
    #[must_use]
    pub(crate) fn page_alloc_layout(&self) -> Layout {
        Layout::from_size_align(self.page_bytes, align_of::<*const u8>())
            .expect("page layout is valid: non-zero size, power-of-two alignment")
    }
}
