//! Serial device access through termios.
//!
//! Opens the port non-blocking and exclusively, puts it in raw 8N1 mode, and
//! exposes DTR as the device reset line.

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use std::ffi::CString;
use std::io::{self, ErrorKind};
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::Transport;

const WRITE_WAIT_MS: libc::c_int = 100;

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

/// Whether `baud` can be configured on this platform.
pub fn is_supported_baud(baud: u32) -> bool {
    baud_constant(baud).is_some()
}

/// Helper that formats OS errors with additional context.
fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

fn should_retry(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

/// Exclusive handle to a serial device.
#[derive(Debug)]
pub struct SerialPort {
    fd: RawFd,
    path: String,
    baud: u32,
}

impl SerialPort {
    /// Open `path` at `baud`. Fails when the device is missing or already claimed.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let speed =
            baud_constant(baud).ok_or_else(|| anyhow!("unsupported baud rate: {baud}"))?;
        let c_path = CString::new(path)
            .with_context(|| format!("serial port path contains NUL byte: {path}"))?;
        // SAFETY: c_path is a valid NUL-terminated string; the fd is owned by the
        // returned SerialPort and closed on drop (including the error paths below).
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(errno_error(&format!("failed to open serial port {path}")));
        }
        let port = Self {
            fd,
            path: path.to_string(),
            baud,
        };
        port.claim_exclusive()?;
        port.configure(speed)?;
        log_debug(&format!("serial port {path} opened at {baud} baud"));
        Ok(port)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    fn claim_exclusive(&self) -> Result<()> {
        // SAFETY: flock/ioctl only touch the fd owned by self.
        if unsafe { libc::flock(self.fd, libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            return Err(errno_error(&format!(
                "serial port {} is already in use",
                self.path
            )));
        }
        if unsafe { libc::ioctl(self.fd, libc::TIOCEXCL as _) } != 0 {
            return Err(errno_error(&format!(
                "failed to claim serial port {} exclusively",
                self.path
            )));
        }
        Ok(())
    }

    fn configure(&self, speed: libc::speed_t) -> Result<()> {
        // SAFETY: termios is a plain C struct; zeroed is a valid baseline before tcgetattr.
        let mut tio: libc::termios = unsafe { mem::zeroed() };
        // SAFETY: tio is a valid, writable termios and fd is open.
        if unsafe { libc::tcgetattr(self.fd, &mut tio) } != 0 {
            return Err(errno_error("tcgetattr failed"));
        }
        // SAFETY: cfmakeraw only rewrites the struct it is handed.
        unsafe { libc::cfmakeraw(&mut tio) };
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cflag &= !(libc::CSTOPB | libc::PARENB | libc::CSIZE);
        tio.c_cflag |= libc::CS8;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 0;
        // SAFETY: tio is initialized; speed comes from baud_constant.
        unsafe {
            if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0
            {
                return Err(errno_error("cfsetspeed failed"));
            }
            if libc::tcsetattr(self.fd, libc::TCSANOW, &tio) != 0 {
                return Err(errno_error("tcsetattr failed"));
            }
        }
        Ok(())
    }

    fn wait_writable(&self) -> io::Result<()> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLOUT,
            revents: 0,
        };
        // SAFETY: pfd is a valid pollfd for the owned fd.
        let ready = unsafe { libc::poll(&mut pfd, 1, WRITE_WAIT_MS) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Transport for SerialPort {
    fn set_reset_line(&mut self, asserted: bool) -> io::Result<()> {
        let bits: libc::c_int = libc::TIOCM_DTR;
        let request = if asserted {
            libc::TIOCMBIS
        } else {
            libc::TIOCMBIC
        };
        // SAFETY: bits outlives the call; the fd is owned by self.
        if unsafe { libc::ioctl(self.fd, request as _, &bits) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        // SAFETY: tcflush only discards queued data on the owned fd.
        if unsafe { libc::tcflush(self.fd, libc::TCIFLUSH) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: pfd is a valid pollfd for the owned fd.
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == ErrorKind::Interrupted {
                Ok(0)
            } else {
                Err(err)
            };
        }
        if ready == 0 {
            return Ok(0);
        }
        if pfd.revents & libc::POLLIN == 0 {
            return Err(io::Error::new(
                ErrorKind::BrokenPipe,
                format!("serial port {} hung up", self.path),
            ));
        }
        // SAFETY: buf is valid for buf.len() bytes of writes.
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return if should_retry(&err) { Ok(0) } else { Err(err) };
        }
        if n == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("serial port {} closed", self.path),
            ));
        }
        Ok(n as usize)
    }

    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            // SAFETY: data points to data.len() readable bytes.
            let written =
                unsafe { libc::write(self.fd, data.as_ptr() as *const libc::c_void, data.len()) };
            if written < 0 {
                let err = io::Error::last_os_error();
                if should_retry(&err) {
                    self.wait_writable()?;
                    continue;
                }
                return Err(err);
            }
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "write to serial port returned 0",
                ));
            }
            data = data.get(written as usize..).unwrap_or(&[]);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        // SAFETY: tcdrain waits for queued output on the owned fd.
        if unsafe { libc::tcdrain(self.fd) } != 0 {
            let err = io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.path.clone()
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if self.fd >= 0 {
            // SAFETY: fd was opened by SerialPort::open and is closed exactly once here.
            unsafe {
                libc::close(self.fd);
            }
            log_debug(&format!("serial port {} closed", self.path));
        }
    }
}
