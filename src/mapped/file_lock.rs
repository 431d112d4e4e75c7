//! Reentrant, thread-scoped advisory file locking.
//!
//! Two layers compose here. Within a process, a `Mutex`+`Condvar` state
//! machine (`Unlocked` → `Pending` → `Held(thread, depth)`) gives real
//! cross-thread exclusion with same-thread reentrancy — something the OS
//! primitives don't provide on their own, since `flock` locks attach to
//! the open file description (so a second thread locking the *same* fd
//! would never block) and POSIX `fcntl` record locks attach to the
//! process (so a second thread in the same process could likewise sail
//! through). Only once a thread actually transitions the state out of
//! `Unlocked` does it make the OS call (`flock` on Unix, `LockFileEx` on
//! Windows), which is what excludes other processes.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::error::{BytesError, Result};

enum Status {
    Unlocked,
    Pending,
    Held(ThreadId, usize),
}

/// A reentrant advisory lock over a single file.
pub struct FileLock {
    file: File,
    state: Mutex<Status>,
    cv: Condvar,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held = matches!(*self.state.lock().unwrap(), Status::Held(..));
        f.debug_struct("FileLock").field("held", &held).finish()
    }
}

impl FileLock {
    /// Opens (creating if necessary) the lock file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(FileLock {
            file,
            state: Mutex::new(Status::Unlocked),
            cv: Condvar::new(),
        })
    }

    /// Blocks until the lock is held by this thread. Reentrant: a thread
    /// that already holds the lock just bumps its depth counter.
    pub fn lock(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match *state {
                Status::Held(t, ref mut depth) if t == me => {
                    *depth += 1;
                    return Ok(());
                }
                Status::Unlocked => break,
                _ => state = self.cv.wait(state).unwrap(),
            }
        }
        *state = Status::Pending;
        drop(state);

        let result = self.os_lock(true);
        let mut state = self.state.lock().unwrap();
        match result {
            Ok(_) => {
                *state = Status::Held(me, 1);
                Ok(())
            }
            Err(e) => {
                *state = Status::Unlocked;
                drop(state);
                self.cv.notify_all();
                Err(e)
            }
        }
    }

    /// Non-blocking variant of [`FileLock::lock`]. Returns `false`
    /// immediately if another thread or process currently holds the lock.
    pub fn try_lock(&self) -> Result<bool> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        match *state {
            Status::Held(t, ref mut depth) if t == me => {
                *depth += 1;
                return Ok(true);
            }
            Status::Unlocked => {}
            _ => return Ok(false),
        }
        *state = Status::Pending;
        drop(state);

        let acquired = self.os_lock(false);
        let mut state = self.state.lock().unwrap();
        match acquired {
            Ok(true) => {
                *state = Status::Held(me, 1);
                Ok(true)
            }
            Ok(false) => {
                *state = Status::Unlocked;
                drop(state);
                self.cv.notify_all();
                Ok(false)
            }
            Err(e) => {
                *state = Status::Unlocked;
                drop(state);
                self.cv.notify_all();
                Err(e)
            }
        }
    }

    /// Releases one level of this thread's reentrant hold. The OS-level
    /// lock is only released once depth reaches zero.
    pub fn unlock(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        match *state {
            Status::Held(t, ref mut depth) if t == me => {
                *depth -= 1;
                if *depth == 0 {
                    *state = Status::Unlocked;
                    drop(state);
                    self.os_unlock()?;
                    self.cv.notify_all();
                }
                Ok(())
            }
            _ => Err(BytesError::InvalidArgument(
                "unlock called by a thread that does not hold the lock",
            )),
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(*self.state.lock().unwrap(), Status::Held(..))
    }

    #[cfg(unix)]
    fn os_lock(&self, blocking: bool) -> Result<bool> {
        use std::os::unix::io::AsRawFd;
        let fd = self.file.as_raw_fd();
        let op = if blocking {
            libc::LOCK_EX
        } else {
            libc::LOCK_EX | libc::LOCK_NB
        };
        let rc = unsafe { libc::flock(fd, op) };
        if rc == 0 {
            Ok(true)
        } else if !blocking {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                Ok(false)
            } else {
                Err(BytesError::Io(err))
            }
        } else {
            Err(BytesError::Io(std::io::Error::last_os_error()))
        }
    }

    #[cfg(unix)]
    fn os_unlock(&self) -> Result<()> {
        use std::os::unix::io::AsRawFd;
        let fd = self.file.as_raw_fd();
        if unsafe { libc::flock(fd, libc::LOCK_UN) } != 0 {
            return Err(BytesError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(windows)]
    fn os_lock(&self, blocking: bool) -> Result<bool> {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::LockFileEx;
        use winapi::um::minwinbase::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, OVERLAPPED};

        let handle = self.file.as_raw_handle();
        let mut flags = LOCKFILE_EXCLUSIVE_LOCK;
        if !blocking {
            flags |= LOCKFILE_FAIL_IMMEDIATELY;
        }
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        let ok = unsafe {
            LockFileEx(
                handle as *mut _,
                flags,
                0,
                u32::MAX,
                u32::MAX,
                &mut overlapped,
            )
        };
        if ok != 0 {
            Ok(true)
        } else if !blocking {
            Ok(false)
        } else {
            Err(BytesError::Io(std::io::Error::last_os_error()))
        }
    }

    #[cfg(windows)]
    fn os_unlock(&self) -> Result<()> {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::UnlockFile;

        let handle = self.file.as_raw_handle();
        let ok = unsafe { UnlockFile(handle as *mut _, 0, 0, u32::MAX, u32::MAX) };
        if ok == 0 {
            Err(BytesError::Io(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if matches!(*self.state.lock().unwrap(), Status::Held(..)) {
            log::warn!("file lock dropped while still held; force-unlocking");
            if let Err(e) = self.os_unlock() {
                log::warn!("force-unlock on drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::NamedTempFile;

    #[test]
    fn reentrant_lock_on_same_thread() {
        let tmp = NamedTempFile::new().unwrap();
        let lock = FileLock::open(tmp.path()).unwrap();
        lock.lock().unwrap();
        lock.lock().unwrap();
        assert!(lock.is_held());
        lock.unlock().unwrap();
        assert!(lock.is_held());
        lock.unlock().unwrap();
        assert!(!lock.is_held());
    }

    #[test]
    fn try_lock_fails_while_another_thread_holds_it() {
        let tmp = NamedTempFile::new().unwrap();
        let lock = Arc::new(FileLock::open(tmp.path()).unwrap());
        lock.lock().unwrap();

        let other = lock.clone();
        let handle = thread::spawn(move || other.try_lock().unwrap());
        assert!(!handle.join().unwrap());

        lock.unlock().unwrap();
    }

    #[test]
    fn a_second_thread_blocks_until_the_first_unlocks() {
        let tmp = NamedTempFile::new().unwrap();
        let lock = Arc::new(FileLock::open(tmp.path()).unwrap());
        lock.lock().unwrap();

        let observed = Arc::new(AtomicBool::new(false));
        let other_lock = lock.clone();
        let other_observed = observed.clone();
        let handle = thread::spawn(move || {
            other_lock.lock().unwrap();
            other_observed.store(true, Ordering::SeqCst);
            other_lock.unlock().unwrap();
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!observed.load(Ordering::SeqCst));
        lock.unlock().unwrap();
        handle.join().unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn unlock_without_holding_errors() {
        let tmp = NamedTempFile::new().unwrap();
        let lock = FileLock::open(tmp.path()).unwrap();
        assert!(lock.unlock().is_err());
    }
}
