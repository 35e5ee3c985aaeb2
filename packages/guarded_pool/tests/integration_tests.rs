//! Integration tests for the `guarded_pool` package.
//!
//! These exercise the pool through its public API only: the allocation
//! protocol, the debug services, the bit-exact header formats, and the
//! bookkeeping identities that hold between any two public calls.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]

use std::mem::size_of;
use std::ptr::NonNull;

use guarded_pool::{BlockInfo, GuardedPool, HeaderKind, PAD_PATTERN, PoolError, PoolStats};
use new_zealand::nz;

/// Checks the bookkeeping identities that must hold between public calls.
fn assert_consistent(stats: &PoolStats, objects_per_page: usize) {
    assert_eq!(
        stats.free_objects + stats.objects_in_use,
        stats.pages_in_use * objects_per_page,
        "every slot is either free or loaned out",
    );
    assert_eq!(
        stats.allocations - stats.deallocations,
        stats.objects_in_use,
        "loans outstanding must equal allocations minus deallocations",
    );
    assert!(stats.most_objects >= stats.objects_in_use);
}

#[test]
fn exhausting_a_single_page_pool() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(4))
        .max_pages(1)
        .debug(true)
        .build();

    let mut objects = Vec::new();
    for _ in 0..4 {
        objects.push(pool.allocate(None).expect("page one has room"));
    }

    let stats = pool.stats();
    assert_eq!(stats.free_objects, 0);
    assert_eq!(stats.objects_in_use, 4);
    assert_eq!(stats.most_objects, 4);
    assert_consistent(&stats, 4);

    assert_eq!(pool.allocate(None), Err(PoolError::NoPages { max_pages: 1 }));

    for object in objects {
        unsafe {
            pool.free(object).unwrap();
        }
    }
    assert_consistent(&pool.stats(), 4);
}

#[test]
fn growth_crosses_pages_and_pads_are_imprinted() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(2))
        .max_pages(2)
        .pad_bytes(2)
        .debug(true)
        .build();

    let _first = pool.allocate(None).unwrap();
    let _second = pool.allocate(None).unwrap();
    assert_eq!(pool.stats().pages_in_use, 1);

    // The third allocation does not fit in page one.
    let third = pool.allocate(None).unwrap();
    assert_eq!(pool.stats().pages_in_use, 2);

    // The byte just below the object is the last byte of its left pad.
    let below = unsafe { third.as_ptr().sub(1).read() };
    assert_eq!(below, PAD_PATTERN);

    assert_consistent(&pool.stats(), 2);
}

#[test]
fn double_free_wins_over_corruption() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .pad_bytes(4)
        .debug(true)
        .build();

    let object = pool.allocate(None).unwrap();
    unsafe {
        pool.free(object).unwrap();

        // Damage the freed slot's left pad, then free it again: the
        // double-free check runs first and must win.
        object.as_ptr().sub(1).write(0x00);
        assert_eq!(
            pool.free(object),
            Err(PoolError::DoubleFree {
                address: object.as_ptr() as usize
            })
        );
    }

    // The damaged slot is reported exactly once, not once per pad region.
    let mut reports = 0;
    let corrupted = pool.validate_pages(|damaged, _| {
        assert_eq!(damaged, object);
        reports += 1;
    });
    assert_eq!(corrupted, 1);
    assert_eq!(reports, 1);
}

#[test]
fn bad_boundary_leaves_the_object_live() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .debug(true)
        .build();

    let object = pool.allocate(None).unwrap();
    let shifted = unsafe { object.byte_add(1) };

    unsafe {
        assert_eq!(
            pool.free(shifted),
            Err(PoolError::BadBoundary {
                address: shifted.as_ptr() as usize
            })
        );
    }

    // The failed free changed nothing: the object is still loaned out and
    // can be freed normally.
    assert_eq!(pool.stats().objects_in_use, 1);
    unsafe {
        pool.free(object).unwrap();
    }
    assert_eq!(pool.stats().objects_in_use, 0);
}

#[test]
fn basic_header_numbers_allocations() {
    let pad_bytes = 2;
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(4))
        .pad_bytes(pad_bytes)
        .header(HeaderKind::Basic)
        .debug(true)
        .build();

    let mut objects = Vec::new();
    for _ in 0..7 {
        objects.push(pool.allocate(None).unwrap());
    }

    let seventh = objects[6];
    let read_number = |object: NonNull<u8>| {
        let mut bytes = [0_u8; 4];
        unsafe {
            std::ptr::copy_nonoverlapping(
                object.as_ptr().sub(pad_bytes + 5).cast_const(),
                bytes.as_mut_ptr(),
                4,
            );
        }
        u32::from_le_bytes(bytes)
    };
    let read_flag = |object: NonNull<u8>| unsafe { object.as_ptr().sub(pad_bytes + 1).read() };

    assert_eq!(read_number(seventh), 7);
    assert_eq!(read_flag(seventh) & 0x01, 0x01);

    unsafe {
        pool.free(seventh).unwrap();
    }

    assert_eq!(read_number(seventh), 0);
    assert_eq!(read_flag(seventh) & 0x01, 0x00);
}

#[test]
fn external_header_owns_a_labelled_record() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(16))
        .header(HeaderKind::External)
        .build();

    let object = pool.allocate(Some("alpha")).unwrap();

    let cell = unsafe {
        object
            .as_ptr()
            .sub(size_of::<*const u8>())
            .cast::<*mut BlockInfo>()
    };

    let record_ptr = unsafe { cell.read_unaligned() };
    assert!(!record_ptr.is_null());

    let record = unsafe { &*record_ptr };
    assert_eq!(record.label(), Some(b"alpha\0".as_slice()));
    assert!(record.in_use());
    assert_eq!(record.allocation_number() as usize, pool.stats().allocations);

    unsafe {
        pool.free(object).unwrap();
        assert!(cell.read_unaligned().is_null());
    }
}

#[test]
fn allocate_then_free_restores_occupancy() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(4))
        .pad_bytes(2)
        .header(HeaderKind::Basic)
        .debug(true)
        .build();

    // Prime the pool past its fresh state.
    let keeper = pool.allocate(None).unwrap();
    let before = pool.stats();

    let object = pool.allocate(None).unwrap();
    unsafe {
        pool.free(object).unwrap();
    }

    let after = pool.stats();
    assert_eq!(after.objects_in_use, before.objects_in_use);
    assert_eq!(after.free_objects, before.free_objects);
    assert_eq!(after.pages_in_use, before.pages_in_use);
    assert_eq!(after.allocations, before.allocations + 1);
    assert_eq!(after.deallocations, before.deallocations + 1);
    assert!(after.most_objects >= before.most_objects);

    unsafe {
        pool.free(keeper).unwrap();
    }
}

#[test]
fn pages_are_created_exactly_at_capacity_boundaries() {
    let objects_per_page = 3;
    let max_pages = 2;
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(3))
        .max_pages(max_pages)
        .build();

    for k in 1..=(objects_per_page * max_pages) {
        let pages_before = pool.stats().pages_in_use;
        pool.allocate(None).unwrap();
        let pages_after = pool.stats().pages_in_use;

        let expect_new_page = k % objects_per_page == 1;
        assert_eq!(
            pages_after,
            if expect_new_page {
                pages_before + 1
            } else {
                pages_before
            },
            "allocation {k} page-creation behavior",
        );
    }

    assert!(matches!(
        pool.allocate(None),
        Err(PoolError::NoPages { .. })
    ));
}

#[test]
fn freed_object_is_reissued_first() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(4))
        .debug(true)
        .build();

    let _other = pool.allocate(None).unwrap();
    let a = pool.allocate(None).unwrap();
    unsafe {
        pool.free(a).unwrap();
    }

    assert_eq!(pool.free_list_head(), Some(a));
    assert_eq!(pool.allocate(None).unwrap(), a);
}

#[test]
fn returned_addresses_sit_on_the_slot_grid() {
    let pad_bytes = 3;
    let header = HeaderKind::Basic;
    let object_size = 8_usize;
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(4))
        .max_pages(1)
        .pad_bytes(pad_bytes)
        .header(header)
        .debug(true)
        .build();

    let stride = header.size() + 2 * pad_bytes + object_size;
    let first_object_offset = size_of::<*const u8>() + header.size() + pad_bytes;

    for _ in 0..4 {
        let object = pool.allocate(None).unwrap();
        let page = pool.page_list_head().expect("a page exists after allocating");

        let offset = object.as_ptr() as usize - page.as_ptr() as usize;
        assert!(offset < pool.stats().page_size);
        assert_eq!((offset - first_object_offset) % stride, 0);
    }
}

#[test]
fn freed_addresses_land_on_the_free_list() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(2))
        .debug(true)
        .build();

    let a = pool.allocate(None).unwrap();
    let b = pool.allocate(None).unwrap();

    unsafe {
        pool.free(a).unwrap();
    }
    assert_eq!(pool.free_list_head(), Some(a));

    unsafe {
        pool.free(b).unwrap();
    }
    assert_eq!(pool.free_list_head(), Some(b));
}

#[test]
fn pads_stay_intact_across_a_busy_lifetime() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(16))
        .objects_per_page(nz!(4))
        .pad_bytes(4)
        .header(HeaderKind::Extended { user_bytes: 8 })
        .debug(true)
        .build();

    let mut live = Vec::new();
    for round in 0..8 {
        for _ in 0..3 {
            let object = pool.allocate(None).unwrap();
            unsafe {
                // Write through the whole loaned region, as a client would.
                std::ptr::write_bytes(object.as_ptr(), 0x5A, 16);
            }
            live.push(object);
        }

        if round % 2 == 1 {
            for object in live.drain(..) {
                unsafe {
                    pool.free(object).unwrap();
                }
            }
        }
    }

    assert_eq!(pool.validate_pages(|_, _| ()), 0);

    for object in live {
        unsafe {
            pool.free(object).unwrap();
        }
    }
    assert_eq!(pool.validate_pages(|_, _| ()), 0);
}

#[test]
fn dump_walks_pages_newest_first() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(2))
        .build();

    // Fill two pages.
    let mut objects = Vec::new();
    for _ in 0..4 {
        objects.push(pool.allocate(None).unwrap());
    }

    let head = pool.page_list_head().unwrap();

    let mut reported = Vec::new();
    let in_use = pool.dump_memory_in_use(|object, _| reported.push(object));
    assert_eq!(in_use, 4);
    assert_eq!(reported.len(), 4);

    // The newest page's slots come first, and within a page addresses
    // ascend.
    let head_base = head.as_ptr() as usize;
    let page_size = pool.stats().page_size;
    for object in &reported[..2] {
        let address = object.as_ptr() as usize;
        assert!((head_base..head_base + page_size).contains(&address));
    }
    assert!(reported[0] < reported[1]);
    assert!(reported[2] < reported[3]);
}

#[test]
fn extended_header_counts_reuse_through_a_slot() {
    let pad_bytes = 2;
    let mut pool = GuardedPool::builder()
        .object_size(nz!(8))
        .objects_per_page(nz!(1))
        .max_pages(1)
        .pad_bytes(pad_bytes)
        .header(HeaderKind::Extended { user_bytes: 4 })
        .debug(true)
        .build();

    let read_reuse = |object: NonNull<u8>| {
        let mut bytes = [0_u8; 2];
        unsafe {
            std::ptr::copy_nonoverlapping(
                object.as_ptr().sub(pad_bytes + 7).cast_const(),
                bytes.as_mut_ptr(),
                2,
            );
        }
        u16::from_le_bytes(bytes)
    };

    let mut last = None;
    for expected_reuse in 1..=5_u16 {
        let object = pool.allocate(None).unwrap();
        if let Some(previous) = last {
            assert_eq!(object, previous, "a single-slot pool recycles one slot");
        }
        assert_eq!(read_reuse(object), expected_reuse);
        unsafe {
            pool.free(object).unwrap();
        }
        last = Some(object);
    }
}

#[test]
fn passthrough_counts_usage_without_carving_pages() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(32))
        .use_system_allocator()
        .debug(true)
        .build();

    let a = pool.allocate(Some("ignored")).unwrap();
    let b = pool.allocate(None).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.objects_in_use, 2);
    assert_eq!(stats.most_objects, 2);
    assert_eq!(stats.pages_in_use, 0);
    assert_eq!(stats.free_objects, 0);
    assert_eq!(stats.object_size, 32);

    assert_eq!(pool.dump_memory_in_use(|_, _| ()), 0);

    unsafe {
        pool.free(a).unwrap();
        pool.free(b).unwrap();
    }
    assert_eq!(pool.stats().deallocations, 2);
    assert_eq!(pool.stats().objects_in_use, 0);
}

#[test]
fn labels_are_private_copies() {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(16))
        .header(HeaderKind::External)
        .build();

    let label = String::from("transient");
    let object = pool.allocate(Some(&label)).unwrap();
    drop(label);

    let record = unsafe {
        &*object
            .as_ptr()
            .sub(size_of::<*const u8>())
            .cast::<*mut BlockInfo>()
            .read_unaligned()
    };
    assert_eq!(record.label(), Some(b"transient\0".as_slice()));

    unsafe {
        pool.free(object).unwrap();
    }
}
