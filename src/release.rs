#![allow(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

//! Hint the allocator to hand freed pages back to the kernel.
//!
//! Only glibc exposes a trim entry point. Elsewhere large buffers are
//! already unmapped on drop and there is nothing further to ask for.

/// Returns `true` when the allocator reports that memory went back to the OS.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn release_to_os() -> bool {
    // SAFETY: malloc_trim only walks glibc's own arenas and takes no pointers.
    unsafe { libc::malloc_trim(0) == 1 }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn release_to_os() -> bool {
    false
}
