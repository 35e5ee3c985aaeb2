//! Basic usage of [`GuardedPool`]: build a pool, loan out objects, observe
//! the statistics, and return the loans.

use guarded_pool::{GuardedPool, PoolError};
use new_zealand::nz;

fn main() -> Result<(), PoolError> {
    // One pool serves one object size. Pages of eight 48-byte slots are
    // carved on demand.
    let mut pool = GuardedPool::builder()
        .object_size(nz!(48))
        .objects_per_page(nz!(8))
        .build();

    println!(
        "fresh pool: {} pages, {} free objects",
        pool.stats().pages_in_use,
        pool.stats().free_objects
    );

    // The first allocation creates the first page.
    let mut loans = Vec::new();
    for _ in 0..10 {
        loans.push(pool.allocate(None)?);
    }

    let stats = pool.stats();
    println!(
        "after 10 allocations: {} pages, {} in use, {} free, peak {}",
        stats.pages_in_use, stats.objects_in_use, stats.free_objects, stats.most_objects
    );

    // Loaned objects are raw memory; write through them freely.
    for (index, object) in loans.iter().enumerate() {
        // SAFETY: Each address is a live 48-byte loan from the pool.
        unsafe {
            object.as_ptr().write_bytes(index as u8, 48);
        }
    }

    // Return every loan. Freed slots are reissued LIFO.
    for object in loans.drain(..) {
        // SAFETY: Each address is a live loan from this pool.
        unsafe {
            pool.free(object)?;
        }
    }

    let stats = pool.stats();
    println!(
        "after returning them: {} in use, {} free, {} total allocations",
        stats.objects_in_use, stats.free_objects, stats.allocations
    );

    Ok(())
}
