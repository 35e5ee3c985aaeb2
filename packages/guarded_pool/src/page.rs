use std::alloc::{alloc, dealloc};
use std::ptr::{self, NonNull};

use crate::config::{PAD_PATTERN, UNALLOCATED_PATTERN};
use crate::free_list::FreeList;
use crate::layout::{BlockLayout, PAGE_LINK_BYTES};
use crate::PoolError;

/// One contiguous acquisition from the system allocator, subdivided into
/// equal slots.
///
/// The first pointer-sized bytes are the page-link cell chaining pages
/// newest-first; the remainder is `objects_per_page` slots of
/// `block_stride` bytes each. The page owns its memory and releases it on
/// drop. Slots are never released individually.
#[derive(Debug)]
pub(crate) struct Page {
    base: NonNull<u8>,
    layout: BlockLayout,
}

impl Page {
    /// Acquires a page, imprints patterns, carves slots, and chains every
    /// slot onto `free_list` in ascending address order.
    ///
    /// Guard regions receive the pad pattern unconditionally; they are the
    /// corruption tripwire and must be valid from birth. Object regions
    /// receive the unallocated pattern only when `debug` is set. Header
    /// regions are zeroed.
    ///
    /// `previous_head` is stored in the page-link cell (null for the first
    /// page), making this page the new head of the page list.
    ///
    /// On failure nothing is published: the free list is untouched and no
    /// memory is retained.
    pub(crate) fn acquire(
        layout: BlockLayout,
        previous_head: *mut u8,
        debug: bool,
        free_list: &mut FreeList,
    ) -> Result<Self, PoolError> {
        let alloc_layout = layout.page_alloc_layout();

        // SAFETY: The layout has non-zero size (at least the link cell plus
        // one slot of at least one byte).
        let Some(base) = NonNull::new(unsafe { alloc(alloc_layout) }) else {
            return Err(PoolError::NoMemory {
                context: "page acquisition",
            });
        };

        // SAFETY: The allocation is pointer-aligned and at least
        // pointer-sized, so the link cell write at offset zero is in bounds
        // and aligned.
        unsafe {
            base.as_ptr().cast::<*mut u8>().write(previous_head);
        }

        let mut slot = PAGE_LINK_BYTES;
        for _ in 0..layout.objects_per_page() {
            let object_offset = slot + layout.header_size() + layout.pad_bytes();

            // SAFETY: Each region below lies within the page: the final
            // slot's right pad ends exactly at page_bytes, by construction
            // of the layout.
            unsafe {
                let slot_ptr = base.byte_add(slot);
                ptr::write_bytes(slot_ptr.as_ptr(), 0, layout.header_size());

                let left_pad = slot_ptr.byte_add(layout.header_size());
                ptr::write_bytes(left_pad.as_ptr(), PAD_PATTERN, layout.pad_bytes());

                let object = base.byte_add(object_offset);
                if debug {
                    ptr::write_bytes(object.as_ptr(), UNALLOCATED_PATTERN, layout.object_size());
                }

                let right_pad = object.byte_add(layout.object_size());
                ptr::write_bytes(right_pad.as_ptr(), PAD_PATTERN, layout.pad_bytes());

                // SAFETY: The object region is at least pointer-sized
                // (construction contract) and stays valid until the pool
                // drops the page; the slot was not previously listed.
                free_list.push_front(object);
            }

            slot += layout.block_stride();
        }

        Ok(Self { base, layout })
    }

    /// Base address of the page; doubles as the page's identity in the
    /// page list.
    #[must_use]
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Whether `address` falls strictly inside this page.
    #[must_use]
    pub(crate) fn contains(&self, address: NonNull<u8>) -> bool {
        let start = self.base.as_ptr() as usize;
        let end = start + self.layout.page_bytes();

        (start..end).contains(&(address.as_ptr() as usize))
    }

    /// Object addresses of every slot, in ascending address order.
    pub(crate) fn objects(&self) -> impl Iterator<Item = NonNull<u8>> + '_ {
        let first = self.layout.first_object_offset();
        let stride = self.layout.block_stride();

        (0..self.layout.objects_per_page()).map(move |index| {
            // SAFETY: Every slot's object region lies within the page by
            // construction of the layout.
            unsafe { self.base.byte_add(first + index * stride) }
        })
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // SAFETY: The memory was acquired in acquire() with this same
        // layout and has not been released since.
        unsafe {
            dealloc(self.base.as_ptr(), self.layout.page_alloc_layout());
        }
    }
}

// SAFETY: Page owns its allocation outright and shares no thread-local
// state; the raw pointer is only an ownership handle. Moving a page between
// threads is sound as long as the pool's single-threaded call protocol is
// upheld, which the pool's own Send bound documents.
unsafe impl Send for Page {}

/// Whether both guard regions bracketing `object` still hold the pad
/// pattern everywhere.
///
/// Vacuously true when the layout has no pad bytes.
///
/// # Safety
///
/// `object` must be a slot object address within a live page laid out by
/// `layout`, so that `pad_bytes` bytes on each side of the object region
/// are readable.
#[must_use]
pub(crate) unsafe fn pads_intact(layout: &BlockLayout, object: NonNull<u8>) -> bool {
    for index in 0..layout.pad_bytes() {
        // SAFETY: The caller guarantees both pad regions are readable.
        let (left, right) = unsafe {
            (
                object.as_ptr().sub(layout.pad_bytes()).add(index).read(),
                object.as_ptr().add(layout.object_size()).add(index).read(),
            )
        };

        if left != PAD_PATTERN || right != PAD_PATTERN {
            return false;
        }
    }

    true
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::num::NonZero;

    use super::*;
    use crate::config::{HeaderKind, PoolConfig};

    fn layout(
        object_size: usize,
        objects_per_page: usize,
        pad_bytes: usize,
        header: HeaderKind,
    ) -> BlockLayout {
        BlockLayout::new(&PoolConfig::new(
            NonZero::new(object_size).unwrap(),
            NonZero::new(objects_per_page).unwrap(),
            None,
            pad_bytes,
            header,
            false,
            true,
        ))
    }

    #[test]
    fn acquire_chains_slots_ascending() {
        let layout = layout(8, 4, 0, HeaderKind::None);
        let mut free_list = FreeList::new();

        let page = Page::acquire(layout, std::ptr::null_mut(), true, &mut free_list).unwrap();

        // Ascending pushes leave the highest-addressed slot at the head.
        let objects: Vec<_> = page.objects().collect();
        assert_eq!(objects.len(), 4);
        assert_eq!(free_list.head(), Some(objects[3]));
        assert_eq!(free_list.pop_front(), Some(objects[3]));
        assert_eq!(free_list.pop_front(), Some(objects[2]));
        assert_eq!(free_list.pop_front(), Some(objects[1]));
        assert_eq!(free_list.pop_front(), Some(objects[0]));
        assert!(free_list.pop_front().is_none());
    }

    #[test]
    fn acquire_imprints_patterns() {
        let layout = layout(16, 2, 3, HeaderKind::Basic);
        let mut free_list = FreeList::new();

        let page = Page::acquire(layout, std::ptr::null_mut(), true, &mut free_list).unwrap();

        for object in page.objects() {
            unsafe {
                // Header region is zeroed.
                let header = object.as_ptr().sub(layout.header_back_offset());
                for offset in 0..layout.header_size() {
                    assert_eq!(header.add(offset).read(), 0);
                }

                // Both pads hold the pad pattern.
                assert!(pads_intact(&layout, object));

                // Object bytes past the link cell hold the unallocated
                // pattern (the link cell itself was overwritten when the
                // slot joined the free list).
                for offset in size_of::<*const u8>()..layout.object_size() {
                    assert_eq!(object.as_ptr().add(offset).read(), UNALLOCATED_PATTERN);
                }
            }
        }
    }

    #[test]
    fn acquire_without_debug_still_writes_pads() {
        let layout = layout(16, 2, 4, HeaderKind::None);
        let mut free_list = FreeList::new();

        let page = Page::acquire(layout, std::ptr::null_mut(), false, &mut free_list).unwrap();

        for object in page.objects() {
            unsafe {
                assert!(pads_intact(&layout, object));
            }
        }
    }

    #[test]
    fn link_cell_records_previous_head() {
        let layout = layout(8, 1, 0, HeaderKind::None);
        let mut free_list = FreeList::new();

        let first = Page::acquire(layout, std::ptr::null_mut(), false, &mut free_list).unwrap();
        let second =
            Page::acquire(layout, first.base().as_ptr(), false, &mut free_list).unwrap();

        unsafe {
            assert!(first.base().as_ptr().cast::<*mut u8>().read().is_null());
            assert_eq!(
                second.base().as_ptr().cast::<*mut u8>().read(),
                first.base().as_ptr()
            );
        }
    }

    #[test]
    fn contains_is_strict() {
        let layout = layout(8, 2, 0, HeaderKind::None);
        let mut free_list = FreeList::new();

        let page = Page::acquire(layout, std::ptr::null_mut(), false, &mut free_list).unwrap();

        let base = page.base();
        assert!(page.contains(base));

        let last_inside = unsafe { base.byte_add(layout.page_bytes() - 1) };
        assert!(page.contains(last_inside));

        // Containment is strict: one past the end is outside.
        let one_past = unsafe { base.byte_add(layout.page_bytes()) };
        assert!(!page.contains(one_past));
    }

    #[test]
    fn pads_intact_detects_either_side() {
        let layout = layout(8, 1, 2, HeaderKind::None);
        let mut free_list = FreeList::new();

        let page = Page::acquire(layout, std::ptr::null_mut(), false, &mut free_list).unwrap();
        let object = page.objects().next().unwrap();

        unsafe {
            assert!(pads_intact(&layout, object));

            object.as_ptr().sub(1).write(0x00);
            assert!(!pads_intact(&layout, object));

            object.as_ptr().sub(1).write(PAD_PATTERN);
            object.as_ptr().add(layout.object_size() + 1).write(0x7F);
            assert!(!pads_intact(&layout, object));
        }
    }
}
