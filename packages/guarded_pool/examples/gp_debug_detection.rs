//! Demonstrates the pool's debug services: double-free detection, boundary
//! checking, and pad-corruption detection.

use guarded_pool::{GuardedPool, HeaderKind, PoolError};
use new_zealand::nz;

fn main() -> Result<(), PoolError> {
    let mut pool = GuardedPool::builder()
        .object_size(nz!(32))
        .objects_per_page(nz!(4))
        .pad_bytes(4)
        .header(HeaderKind::Basic)
        .debug(true)
        .build();

    let object = pool.allocate(None)?;

    // Freeing the same address twice is rejected.
    // SAFETY: The address is a live loan from this pool; the second free is
    // rejected by the debug checks before anything happens.
    unsafe {
        pool.free(object)?;
        let error = pool.free(object).expect_err("second free must be rejected");
        println!("double free: {error}");
    }

    // Freeing an address that is not on the slot grid is rejected.
    let object = pool.allocate(None)?;
    // SAFETY: The shifted address stays inside the pool's page, and the
    // debug checks reject it before anything happens.
    unsafe {
        let shifted = object.byte_add(1);
        let error = pool.free(shifted).expect_err("off-grid free must be rejected");
        println!("bad boundary: {error}");
    }

    // Overrunning the object tramples the guard bytes; the pool notices on
    // free and on demand.
    // SAFETY: The write stays within the pool's page (it damages only the
    // slot's own guard region), and the corrupted free is rejected.
    unsafe {
        object.as_ptr().add(32).write(0);
        let error = pool.free(object).expect_err("corrupted free must be rejected");
        println!("corruption: {error}");
    }

    let damaged = pool.validate_pages(|address, size| {
        println!("damaged slot: {size} bytes at {:p}", address.as_ptr());
    });
    println!("validate_pages found {damaged} damaged slot(s)");

    Ok(())
}
