use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf};
use tracing::debug;

use crate::error::{Result, TransportError};

const TTY_NAME_MAX: usize = 256;

/// A freshly allocated pseudo-terminal pair.
///
/// The consumer side is switched to raw mode so binary frames pass the line
/// discipline untouched and nothing written by the controller is echoed back.
/// The controller side is non-blocking and close-on-exec.
#[derive(Debug)]
pub struct PtyPair {
    controller: OwnedFd,
    consumer: OwnedFd,
}

impl PtyPair {
    /// Allocate a pseudo-terminal pair.
    pub fn open() -> Result<Self> {
        let mut controller: libc::c_int = -1;
        let mut consumer: libc::c_int = -1;

        // SAFETY: both out-pointers are valid for writes; name, termios and
        // winsize are optional and passed as null.
        let rc = unsafe {
            libc::openpty(
                &mut controller,
                &mut consumer,
                std::ptr::null_mut(),
                std::ptr::null_mut::<libc::termios>(),
                std::ptr::null_mut::<libc::winsize>(),
            )
        };
        if rc != 0 {
            return Err(TransportError::OpenPty(io::Error::last_os_error()));
        }

        // SAFETY: openpty succeeded, so both descriptors are open and owned
        // exclusively by this process from here on.
        let pair = unsafe {
            Self {
                controller: OwnedFd::from_raw_fd(controller),
                consumer: OwnedFd::from_raw_fd(consumer),
            }
        };

        set_cloexec(pair.controller.as_raw_fd()).map_err(TransportError::Configure)?;
        set_cloexec(pair.consumer.as_raw_fd()).map_err(TransportError::Configure)?;
        set_nonblocking(pair.controller.as_raw_fd()).map_err(TransportError::Configure)?;
        make_raw(pair.consumer.as_raw_fd()).map_err(TransportError::Configure)?;

        debug!(
            controller = pair.controller.as_raw_fd(),
            consumer = pair.consumer.as_raw_fd(),
            "opened pseudo-terminal pair"
        );
        Ok(pair)
    }

    /// Real filesystem path of the consumer side (e.g. `/dev/pts/3`).
    pub fn consumer_path(&self) -> Result<PathBuf> {
        let fd = self.consumer.as_raw_fd();
        let proc_link = Path::new("/proc/self/fd").join(fd.to_string());
        match std::fs::canonicalize(&proc_link) {
            Ok(path) => Ok(path),
            Err(_) => tty_name(fd).map_err(|source| TransportError::ResolvePath { fd, source }),
        }
    }

    /// Split into `(controller, consumer)` descriptors.
    pub fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.controller, self.consumer)
    }
}

/// Async byte I/O over the controller side of a pseudo-terminal.
///
/// Readiness comes from the runtime's reactor and is cleared whenever a read
/// or write hits `WouldBlock`, so every wake is consumed by exactly one
/// attempt and an idle line never spins.
#[derive(Debug)]
pub struct PtyController {
    inner: AsyncFd<OwnedFd>,
}

impl PtyController {
    /// Register a non-blocking controller descriptor with the runtime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(fd: OwnedFd) -> Result<Self> {
        let inner = AsyncFd::with_interest(fd, Interest::READABLE | Interest::WRITABLE)
            .map_err(TransportError::Io)?;
        Ok(Self { inner })
    }
}

impl AsRawFd for PtyController {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.get_ref().as_raw_fd()
    }
}

impl AsyncRead for PtyController {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| read_fd(inner.get_ref().as_raw_fd(), unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for PtyController {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| write_fd(inner.get_ref().as_raw_fd(), buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn write_fd(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    loop {
        // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
        let n = unsafe { libc::write(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl with F_GETFL/F_SETFL on an open descriptor has no memory effects.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl with F_GETFD/F_SETFD on an open descriptor has no memory effects.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn make_raw(fd: RawFd) -> io::Result<()> {
    let mut termios = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `termios` is valid for writes of one `libc::termios`.
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: tcgetattr succeeded and fully initialised the struct.
    let mut termios = unsafe { termios.assume_init() };
    // SAFETY: `termios` is a valid, initialised struct.
    unsafe { libc::cfmakeraw(&mut termios) };
    // SAFETY: `termios` is a valid, initialised struct.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn tty_name(fd: RawFd) -> io::Result<PathBuf> {
    let mut buf = [0 as libc::c_char; TTY_NAME_MAX];
    // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
    let rc = unsafe { libc::ttyname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    // SAFETY: ttyname_r succeeded and wrote a NUL-terminated string into `buf`.
    let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::{Read, Write};
    use std::os::unix::fs::OpenOptionsExt;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn consumer_path_is_a_terminal_device() {
        let pair = PtyPair::open().unwrap();
        let path = pair.consumer_path().unwrap();
        assert!(path.starts_with("/dev"), "unexpected path {path:?}");
        assert!(std::fs::metadata(&path).is_ok());
    }

    #[test]
    fn controller_is_nonblocking() {
        let pair = PtyPair::open().unwrap();
        let mut buf = [0u8; 8];
        let err = read_fd(pair.controller.as_raw_fd(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn binary_bytes_cross_the_line_unmodified() {
        let pair = PtyPair::open().unwrap();
        let path = pair.consumer_path().unwrap();
        let (controller, _consumer) = pair.into_parts();
        let mut controller = PtyController::new(controller).unwrap();

        let mut client = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .unwrap();

        // Bytes a cooked terminal would rewrite: CR, LF, ^C, ^D, DEL.
        let sent = [0xFF, 0xAA, 0x0D, 0x0A, 0x03, 0x04, 0x7F, 0xFE];
        client.write_all(&sent).unwrap();

        let mut received = [0u8; 8];
        controller.read_exact(&mut received).await.unwrap();
        assert_eq!(received, sent);

        controller.write_all(b"WE DID IT\n").await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"WE DID IT\n");
    }

    #[tokio::test]
    async fn pending_read_wakes_on_client_write() {
        let pair = PtyPair::open().unwrap();
        let path = pair.consumer_path().unwrap();
        let (controller, _consumer) = pair.into_parts();
        let mut controller = PtyController::new(controller).unwrap();

        let writer = tokio::task::spawn_blocking(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            let mut client = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NOCTTY)
                .open(&path)
                .unwrap();
            client.write_all(b"late").unwrap();
            client
        });

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(std::time::Duration::from_secs(5), controller.read(&mut buf))
            .await
            .expect("read should wake")
            .unwrap();
        assert_eq!(&buf[..n], b"late");
        drop(writer.await.unwrap());
    }
}
