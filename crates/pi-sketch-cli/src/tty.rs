//! Terminal input mode for stdin while a status view is listening for keys.

use std::io;
use std::time::Duration;

#[cfg(unix)]
mod imp {
    use std::io;
    use std::mem::MaybeUninit;
    use std::time::Duration;

    const STDIN: libc::c_int = libc::STDIN_FILENO;

    /// Attributes stdin had before key-at-a-time input was switched on.
    pub struct SavedMode(libc::termios);

    impl SavedMode {
        pub fn enter() -> io::Result<Self> {
            let mut original = MaybeUninit::<libc::termios>::uninit();
            // SAFETY: tcgetattr initialises the struct when it returns 0
            let original = unsafe {
                if libc::tcgetattr(STDIN, original.as_mut_ptr()) != 0 {
                    return Err(io::Error::last_os_error());
                }
                original.assume_init()
            };

            let mut keys = original;
            keys.c_lflag &= !(libc::ICANON | libc::ECHO);
            keys.c_cc[libc::VMIN] = 1;
            keys.c_cc[libc::VTIME] = 0;
            // SAFETY: `keys` is a fully initialised termios
            if unsafe { libc::tcsetattr(STDIN, libc::TCSANOW, &keys) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self(original))
        }
    }

    impl Drop for SavedMode {
        fn drop(&mut self) {
            // SAFETY: restores attributes captured by tcgetattr
            unsafe { libc::tcsetattr(STDIN, libc::TCSANOW, &self.0) };
        }
    }

    pub fn wait_readable(timeout: Duration) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: STDIN,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: one valid pollfd
        match unsafe { libc::poll(&mut fd, 1, millis) } {
            n if n > 0 => Ok(true),
            0 => Ok(false),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;
    use std::time::Duration;

    pub struct SavedMode;

    impl SavedMode {
        pub fn enter() -> io::Result<Self> {
            Ok(Self)
        }
    }

    pub fn wait_readable(_timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }
}

/// Restores the previous terminal mode when dropped.
pub use imp::SavedMode;

/// Wait up to `timeout` for stdin to have input.
pub fn wait_readable(timeout: Duration) -> io::Result<bool> {
    imp::wait_readable(timeout)
}
