//! Exclusive advisory locking for the store file.
//!
//! The lock never blocks: a second writer gets `WouldBlock` at once.
//! It is released when the descriptor is closed.

use std::fs::File;
use std::io;

use tracing::debug;

/// Acquire an exclusive, non-blocking advisory lock on `file`.
#[cfg(unix)]
pub fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: `fd` is a valid open descriptor owned by `file` for the whole call.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if ret != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "store file is locked by another process",
            ));
        }
        return Err(err);
    }
    debug!("acquired exclusive lock on store file");
    Ok(())
}

#[cfg(not(unix))]
pub fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    tracing::warn!("file locking not supported on this platform");
    Ok(())
}
