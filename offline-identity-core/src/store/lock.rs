//! Exclusive lock used to serialize store mutations across processes.
//!
//! On native targets the lock is an `flock` (Unix) or `LockFileEx` (Windows)
//! on a dedicated lock file. On `wasm32` it is a no-op: the runtime is single
//! threaded and only the in-process mutex of the owning store applies.

use std::path::Path;

use crate::error::StoreResult;

#[cfg(target_arch = "wasm32")]
mod imp {
    use super::{Path, StoreResult};

    /// No-op store lock.
    #[derive(Debug, Clone)]
    pub struct StoreLock;

    /// No-op lock guard.
    #[derive(Debug)]
    pub struct StoreLockGuard;

    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    impl StoreLock {
        /// Opens the lock. Never fails on this target.
        ///
        /// # Errors
        ///
        /// Never returns an error on this target.
        pub fn open(_path: &Path) -> StoreResult<Self> {
            Ok(Self)
        }

        /// Acquires the lock.
        ///
        /// # Errors
        ///
        /// Never returns an error on this target.
        pub fn lock(&self) -> StoreResult<StoreLockGuard> {
            Ok(StoreLockGuard)
        }

        #[cfg(test)]
        pub fn try_lock(&self) -> StoreResult<Option<StoreLockGuard>> {
            Ok(Some(StoreLockGuard))
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use std::fs::{self, File, OpenOptions};
    use std::sync::Arc;

    use super::{Path, StoreResult};
    use crate::error::StoreError;

    /// File-backed exclusive lock shared by every handle on the same path.
    #[derive(Debug, Clone)]
    pub struct StoreLock {
        file: Arc<File>,
    }

    /// Holds the exclusive lock until dropped.
    #[derive(Debug)]
    pub struct StoreLockGuard {
        file: Arc<File>,
    }

    impl StoreLock {
        /// Opens or creates the lock file at `path`.
        ///
        /// # Errors
        ///
        /// Returns an error if the file or its parent directory cannot be created.
        pub fn open(path: &Path) -> StoreResult<Self> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|err| map_io_err(&err))?;
            Ok(Self {
                file: Arc::new(file),
            })
        }

        /// Blocks until the exclusive lock is held.
        ///
        /// # Errors
        ///
        /// Returns an error if the lock cannot be acquired.
        pub fn lock(&self) -> StoreResult<StoreLockGuard> {
            lock_exclusive(&self.file).map_err(|err| map_io_err(&err))?;
            Ok(self.guard())
        }

        /// Acquires the lock if it is free, returns `None` if another handle holds it.
        #[cfg(test)]
        pub fn try_lock(&self) -> StoreResult<Option<StoreLockGuard>> {
            if try_lock_exclusive(&self.file).map_err(|err| map_io_err(&err))? {
                Ok(Some(self.guard()))
            } else {
                Ok(None)
            }
        }

        fn guard(&self) -> StoreLockGuard {
            StoreLockGuard {
                file: Arc::clone(&self.file),
            }
        }
    }

    impl Drop for StoreLockGuard {
        fn drop(&mut self) {
            let _ = unlock(&self.file);
        }
    }

    fn map_io_err(err: &std::io::Error) -> StoreError {
        StoreError::Lock(err.to_string())
    }

    // Unix: flock

    #[cfg(unix)]
    use std::os::raw::c_int;

    #[cfg(unix)]
    const LOCK_EX: c_int = 2;
    #[cfg(all(unix, test))]
    const LOCK_NB: c_int = 4;
    #[cfg(unix)]
    const LOCK_UN: c_int = 8;

    #[cfg(unix)]
    extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    #[cfg(unix)]
    fn flock_checked(file: &File, operation: c_int) -> std::io::Result<()> {
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
        // SAFETY: the descriptor stays open for as long as `file` is borrowed.
        let result = unsafe { flock(fd, operation) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(unix)]
    fn lock_exclusive(file: &File) -> std::io::Result<()> {
        flock_checked(file, LOCK_EX)
    }

    #[cfg(all(unix, test))]
    fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
        match flock_checked(file, LOCK_EX | LOCK_NB) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[cfg(unix)]
    fn unlock(file: &File) -> std::io::Result<()> {
        flock_checked(file, LOCK_UN)
    }

    // Windows: LockFileEx on the first byte

    #[cfg(windows)]
    type Handle = *mut std::ffi::c_void;

    #[cfg(windows)]
    #[repr(C)]
    #[allow(dead_code, reason = "filled in by the kernel")]
    struct Overlapped {
        internal: usize,
        internal_high: usize,
        offset: u32,
        offset_high: u32,
        h_event: Handle,
    }

    #[cfg(windows)]
    const LOCKFILE_EXCLUSIVE_LOCK: u32 = 0x2;
    #[cfg(all(windows, test))]
    const LOCKFILE_FAIL_IMMEDIATELY: u32 = 0x1;
    #[cfg(all(windows, test))]
    const ERROR_LOCK_VIOLATION: i32 = 33;

    #[cfg(windows)]
    extern "system" {
        fn LockFileEx(
            h_file: Handle,
            flags: u32,
            reserved: u32,
            bytes_to_lock_low: u32,
            bytes_to_lock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
        fn UnlockFileEx(
            h_file: Handle,
            reserved: u32,
            bytes_to_unlock_low: u32,
            bytes_to_unlock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
    }

    #[cfg(windows)]
    fn raw_handle(file: &File) -> Handle {
        std::os::windows::io::AsRawHandle::as_raw_handle(file).cast()
    }

    #[cfg(windows)]
    fn lock_file(file: &File, flags: u32) -> std::io::Result<()> {
        // SAFETY: an all-zero OVERLAPPED is valid and addresses offset 0.
        let mut overlapped: Overlapped = unsafe { std::mem::zeroed() };
        // SAFETY: the handle stays open for as long as `file` is borrowed.
        let result = unsafe {
            LockFileEx(
                raw_handle(file),
                LOCKFILE_EXCLUSIVE_LOCK | flags,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if result == 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    fn lock_exclusive(file: &File) -> std::io::Result<()> {
        lock_file(file, 0)
    }

    #[cfg(all(windows, test))]
    fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
        match lock_file(file, LOCKFILE_FAIL_IMMEDIATELY) {
            Ok(()) => Ok(true),
            Err(err) if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION) => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[cfg(windows)]
    fn unlock(file: &File) -> std::io::Result<()> {
        // SAFETY: an all-zero OVERLAPPED is valid and addresses offset 0.
        let mut overlapped: Overlapped = unsafe { std::mem::zeroed() };
        // SAFETY: the handle stays open for as long as `file` is borrowed.
        let result = unsafe { UnlockFileEx(raw_handle(file), 0, 1, 0, &mut overlapped) };
        if result == 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

pub use imp::StoreLock;
