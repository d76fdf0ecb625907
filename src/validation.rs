#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Result as AnyResult};

pub const BYTES_PER_MB: usize = 1024 * 1024;

/// Number of bytes backing an allocation of `megabytes` MiB.
pub fn allocation_bytes(megabytes: u32) -> AnyResult<usize> {
    let Ok(mb) = usize::try_from(megabytes) else {
        bail!("{megabytes}MB does not fit in the address space");
    };
    match mb.checked_mul(BYTES_PER_MB) {
        Some(bytes) => Ok(bytes),
        None => bail!("{megabytes}MB overflows the address space"),
    }
}
