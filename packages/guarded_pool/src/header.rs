use std::ptr::{self, NonNull};

use crate::layout::BlockLayout;
use crate::HeaderKind;

/// In-use flag bit within Basic and Extended header flag bytes. The other
/// bits are reserved and stay zero.
const IN_USE_FLAG: u8 = 0x01;

/// The record owned by an External header cell while its slot is in use.
///
/// The record is created when the slot is allocated and destroyed when the
/// slot is freed (or when the pool is dropped with the slot still in use).
/// The label byte-string, when present, is owned by the record and carries
/// a trailing NUL byte.
#[derive(Debug)]
pub struct BlockInfo {
    allocation_number: u32,
    in_use: bool,
    label: Option<Box<[u8]>>,
}

impl BlockInfo {
    /// The 1-based allocation number recorded when the slot was handed out.
    #[must_use]
    pub fn allocation_number(&self) -> u32 {
        self.allocation_number
    }

    /// Whether the slot is in use. Always `true` on a live record; the
    /// record is destroyed rather than cleared when the slot is freed.
    #[must_use]
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// The NUL-terminated label bytes, if a label was supplied.
    #[must_use]
    pub fn label(&self) -> Option<&[u8]> {
        self.label.as_deref()
    }
}

/// Writes the header for a slot transitioning to allocated.
///
/// For External headers this creates a fresh [`BlockInfo`] record (copying
/// the label, NUL-terminated) and stores its address in the header cell.
///
/// # Safety
///
/// `object` must be a slot object address within a live page laid out by
/// `layout`, and `kind` must be the header variant that page was carved
/// with.
pub(crate) unsafe fn mark_allocated(
    kind: HeaderKind,
    layout: &BlockLayout,
    object: NonNull<u8>,
    allocation_number: u32,
    label: Option<&str>,
) {
    match kind {
        HeaderKind::None => {}
        HeaderKind::Basic | HeaderKind::Extended { .. } => {
            // SAFETY: The caller guarantees the header region precedes the
            // object; all offsets come from the layout calculator.
            unsafe {
                let flag = object.as_ptr().sub(layout.flag_back_offset());
                flag.write(flag.read() | IN_USE_FLAG);

                let number = object.as_ptr().sub(layout.allocation_number_back_offset());
                ptr::copy_nonoverlapping(allocation_number.to_le_bytes().as_ptr(), number, 4);

                if matches!(kind, HeaderKind::Extended { .. }) {
                    let reuse = object.as_ptr().sub(layout.reuse_counter_back_offset());
                    let mut bytes = [0_u8; 2];
                    ptr::copy_nonoverlapping(reuse.cast_const(), bytes.as_mut_ptr(), 2);
                    let count = u16::from_le_bytes(bytes).wrapping_add(1);
                    ptr::copy_nonoverlapping(count.to_le_bytes().as_ptr(), reuse, 2);
                }
            }
        }
        HeaderKind::External => {
            let record = Box::new(BlockInfo {
                allocation_number,
                in_use: true,
                label: label.map(|text| {
                    let mut bytes = Vec::with_capacity(text.len() + 1);
                    bytes.extend_from_slice(text.as_bytes());
                    bytes.push(0);
                    bytes.into_boxed_slice()
                }),
            });

            // SAFETY: The caller guarantees the pointer-sized cell precedes
            // the object's left pad. The write is unaligned because pads can
            // place the cell at any address.
            unsafe {
                object
                    .as_ptr()
                    .sub(layout.header_back_offset())
                    .cast::<*mut BlockInfo>()
                    .write_unaligned(Box::into_raw(record));
            }
        }
    }
}

/// Clears the header for a slot transitioning to free.
///
/// Basic and Extended headers have their in-use bit cleared and allocation
/// number zeroed; the Extended reuse counter deliberately persists across
/// frees. External headers release their record (label included) and zero
/// the cell.
///
/// # Safety
///
/// Same requirements as [`mark_allocated`]. Additionally, a non-null
/// External cell must hold a pointer produced by [`mark_allocated`] and not
/// released since.
pub(crate) unsafe fn mark_freed(kind: HeaderKind, layout: &BlockLayout, object: NonNull<u8>) {
    match kind {
        HeaderKind::None => {}
        HeaderKind::Basic | HeaderKind::Extended { .. } => {
            // SAFETY: The caller guarantees the header region precedes the
            // object; all offsets come from the layout calculator.
            unsafe {
                let flag = object.as_ptr().sub(layout.flag_back_offset());
                flag.write(flag.read() & !IN_USE_FLAG);

                let number = object.as_ptr().sub(layout.allocation_number_back_offset());
                ptr::write_bytes(number, 0, 4);
            }
        }
        HeaderKind::External => {
            let cell = object
                .as_ptr()
                .sub(layout.header_back_offset())
                .cast::<*mut BlockInfo>();

            // SAFETY: The caller guarantees the cell is readable; it holds
            // either null or a live record pointer.
            let record = unsafe { cell.read_unaligned() };

            if !record.is_null() {
                // SAFETY: Non-null cell values are exclusively
                // Box::into_raw() results from mark_allocated(), consumed
                // exactly once here.
                drop(unsafe { Box::from_raw(record) });

                // SAFETY: The cell remains writable per the caller's
                // contract.
                unsafe {
                    cell.write_unaligned(ptr::null_mut());
                }
            }
        }
    }
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
    use crate::PoolConfig;

    /// A zeroed buffer holding one slot, returning the object offset.
    fn slot_buffer(layout: &BlockLayout) -> (Vec<u8>, usize) {
        let buffer = vec![0_u8; layout.block_stride()];
        let object_offset = layout.header_size() + layout.pad_bytes();
        (buffer, object_offset)
    }

    /// Object address derived from the whole buffer, so the engine's
    /// negative-offset header accesses stay within its provenance.
    fn object_ptr(buffer: &mut [u8], object_offset: usize) -> NonNull<u8> {
        NonNull::new(unsafe { buffer.as_mut_ptr().add(object_offset) }).unwrap()
    }

    fn layout_for(header: HeaderKind, pad_bytes: usize) -> BlockLayout {
        BlockLayout::new(&PoolConfig::new(
            NonZero::new(16).unwrap(),
            NonZero::new(1).unwrap(),
            None,
            pad_bytes,
            header,
            false,
            true,
        ))
    }

    #[test]
    fn basic_header_records_allocation() {
        let layout = layout_for(HeaderKind::Basic, 2);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let object = object_ptr(&mut buffer, object_offset);

        unsafe {
            mark_allocated(HeaderKind::Basic, &layout, object, 7, None);
        }

        // Header bytes, low to high: three reserved zeros, the 4-byte
        // little-endian allocation number, the flag byte.
        assert_eq!(&buffer[..3], &[0, 0, 0]);
        assert_eq!(&buffer[3..7], &7_u32.to_le_bytes());
        assert_eq!(buffer[7], 0x01);
    }

    #[test]
    fn basic_header_clears_on_free() {
        let layout = layout_for(HeaderKind::Basic, 0);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let object = object_ptr(&mut buffer, object_offset);

        unsafe {
            mark_allocated(HeaderKind::Basic, &layout, object, 1234, None);
            mark_freed(HeaderKind::Basic, &layout, object);
        }

        assert_eq!(&buffer[3..7], &[0, 0, 0, 0]);
        assert_eq!(buffer[7], 0x00);
    }

    #[test]
    fn extended_reuse_counter_survives_free() {
        let kind = HeaderKind::Extended { user_bytes: 4 };
        let layout = layout_for(kind, 0);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let object = object_ptr(&mut buffer, object_offset);

        for allocation_number in 1..=3 {
            unsafe {
                mark_allocated(kind, &layout, object, allocation_number, None);
                mark_freed(kind, &layout, object);
            }
        }

        // Header bytes: user region (4), reuse counter (2), allocation
        // number (4), flag (1).
        assert_eq!(&buffer[..4], &[0, 0, 0, 0]);
        assert_eq!(&buffer[4..6], &3_u16.to_le_bytes());
        assert_eq!(&buffer[6..10], &[0, 0, 0, 0]);
        assert_eq!(buffer[10], 0x00);
    }

    #[test]
    fn extended_reuse_counter_wraps() {
        let kind = HeaderKind::Extended { user_bytes: 0 };
        let layout = layout_for(kind, 0);
        let (mut buffer, object_offset) = slot_buffer(&layout);

        // Pre-load the counter at its maximum.
        buffer[..2].copy_from_slice(&u16::MAX.to_le_bytes());

        let object = object_ptr(&mut buffer, object_offset);
        unsafe {
            mark_allocated(kind, &layout, object, 1, None);
        }

        assert_eq!(&buffer[..2], &0_u16.to_le_bytes());
    }

    #[test]
    fn external_record_round_trip() {
        let layout = layout_for(HeaderKind::External, 2);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let object = object_ptr(&mut buffer, object_offset);

        unsafe {
            mark_allocated(HeaderKind::External, &layout, object, 42, Some("alpha"));

            let cell = object
                .as_ptr()
                .sub(layout.header_back_offset())
                .cast::<*mut BlockInfo>();
            let record_ptr = cell.read_unaligned();
            assert!(!record_ptr.is_null());

            let record = &*record_ptr;
            assert_eq!(record.allocation_number(), 42);
            assert!(record.in_use());
            assert_eq!(record.label(), Some(b"alpha\0".as_slice()));

            mark_freed(HeaderKind::External, &layout, object);
            assert!(cell.read_unaligned().is_null());
        }
    }

    #[test]
    fn external_record_without_label() {
        let layout = layout_for(HeaderKind::External, 0);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let object = object_ptr(&mut buffer, object_offset);

        unsafe {
            mark_allocated(HeaderKind::External, &layout, object, 1, None);

            let cell = object
                .as_ptr()
                .sub(layout.header_back_offset())
                .cast::<*mut BlockInfo>();
            let record = &*cell.read_unaligned();
            assert!(record.label().is_none());

            mark_freed(HeaderKind::External, &layout, object);
        }
    }

    #[test]
    fn freeing_a_cleared_external_cell_is_a_no_op() {
        let layout = layout_for(HeaderKind::External, 0);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let object = object_ptr(&mut buffer, object_offset);

        // The cell is zero; mark_freed must not try to release anything.
        unsafe {
            mark_freed(HeaderKind::External, &layout, object);
        }
    }

    #[test]
    fn none_header_is_a_no_op() {
        let layout = layout_for(HeaderKind::None, 2);
        let (mut buffer, object_offset) = slot_buffer(&layout);
        let before = buffer.clone();
        let object = object_ptr(&mut buffer, object_offset);

        unsafe {
            mark_allocated(HeaderKind::None, &layout, object, 9, Some("ignored"));
            mark_freed(HeaderKind::None, &layout, object);
        }

        assert_eq!(buffer, before);
    }
}
