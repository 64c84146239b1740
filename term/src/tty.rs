//! PTY plumbing: the non-blocking read ring, the deadlock-avoiding
//! write path and the printer controller sieve.
//!
//! The read buffer is refilled in place: the unconsumed tail (plus a
//! short history window for the URI matcher) is kept at the front so
//! partial escape sequences and partial UTF-8 characters survive
//! across reads.
#![cfg(unix)]

use crate::urimatch::MAX_PROTOCOL_LEN;
use anyhow::{Context as _, Result};
use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;

pub const FD_BUF_SIZE: usize = 16384;

/// Errors surfaced by the PTY layer.  A hung TTY stays hung: callers
/// observe it once and close the window.
#[derive(Debug, thiserror::Error)]
pub enum TtyError {
    #[error("the tty is hung up")]
    HungUp,
    #[error("tty i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl From<TtyError> for io::Error {
    fn from(err: TtyError) -> io::Error {
        match err {
            TtyError::HungUp => io::Error::from(io::ErrorKind::BrokenPipe),
            TtyError::Io(err) => err,
        }
    }
}

/// Cap on a single write burst, so a blocked child cannot stall us
/// forever while we hold reply data.
const TTY_MAX_WRITE: usize = 256;

/// Printer controller parser state: just enough to spot the exit
/// sequence inside otherwise opaque pass-through data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrState {
    Ground,
    Csi,
    Esc,
    Bracket,
    Five,
    Four,
}

/// The MC 5 printer controller.  While engaged, PTY output bypasses
/// the parser: everything is shipped to the printer sink except
/// XON/XOFF/NUL (eaten) and `CSI 4 i` (exit).
pub struct Printer {
    state: PrState,
    controller: bool,
    sink: Option<Box<dyn Write>>,
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("state", &self.state)
            .field("controller", &self.controller)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Default for Printer {
    fn default() -> Self {
        Printer {
            state: PrState::Ground,
            controller: false,
            sink: None,
        }
    }
}

impl Printer {
    pub fn set_sink(&mut self, sink: Option<Box<dyn Write>>) {
        self.sink = sink;
    }

    pub fn is_available(&self) -> bool {
        self.sink.is_some()
    }

    pub fn controller_active(&self) -> bool {
        self.controller
    }

    pub fn enter_controller(&mut self) {
        if self.sink.is_some() {
            self.controller = true;
            self.state = PrState::Ground;
        }
    }

    pub fn print(&mut self, data: &[u8]) {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(data).ok();
        }
    }

    /// Consume bytes from the stream while controller mode is active.
    /// Returns the number of bytes eaten; on seeing `CSI 4 i` the
    /// controller disengages and the remainder belongs to the parser.
    pub fn intercept(&mut self, data: &[u8]) -> usize {
        if !self.controller {
            return 0;
        }

        let mut pos = 0usize;
        let mut blk_start = 0usize;
        while pos < data.len() {
            let ch = data[pos];
            pos += 1;
            match ch {
                0x11 | 0x13 | 0x00 => {
                    if blk_start < pos - 1 {
                        let chunk = data[blk_start..pos - 1].to_vec();
                        self.print(&chunk);
                    }
                    blk_start = pos;
                    self.state = PrState::Ground;
                }
                0x9b | 0x1b => {
                    if blk_start < pos - 1 {
                        let chunk = data[blk_start..pos - 1].to_vec();
                        self.print(&chunk);
                    }
                    blk_start = pos - 1;
                    self.state = if ch == 0x1b { PrState::Esc } else { PrState::Csi };
                }
                b'[' => {
                    self.state = if self.state == PrState::Esc {
                        PrState::Bracket
                    } else {
                        PrState::Ground
                    };
                }
                b'4' | b'5' => {
                    self.state = if matches!(self.state, PrState::Bracket | PrState::Csi) {
                        if ch == b'4' {
                            PrState::Four
                        } else {
                            PrState::Five
                        }
                    } else {
                        PrState::Ground
                    };
                }
                b'i' => {
                    match self.state {
                        PrState::Four => {
                            // Exit controller mode; the rest of the
                            // stream goes back to the parser.
                            self.controller = false;
                            self.state = PrState::Ground;
                            return pos;
                        }
                        PrState::Five => {
                            // Nested enable: swallow the sequence.
                            blk_start = pos;
                        }
                        _ => {}
                    }
                    self.state = PrState::Ground;
                }
                _ => self.state = PrState::Ground,
            }
        }

        if blk_start < data.len() && self.state == PrState::Ground {
            let chunk = data[blk_start..].to_vec();
            self.print(&chunk);
        }
        pos
    }
}

/// The PTY master side plus the read ring.
pub struct Tty {
    fd: RawFd,
    child: nix::unistd::Pid,
    buf: Box<[u8; FD_BUF_SIZE]>,
    start: usize,
    end: usize,
    hung: bool,
    pub printer: Printer,
}

impl std::fmt::Debug for Tty {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Tty")
            .field("fd", &self.fd)
            .field("child", &self.child)
            .field("buffered", &(self.end - self.start))
            .field("hung", &self.hung)
            .finish()
    }
}

impl Tty {
    /// Fork the shell under a fresh PTY.
    pub fn spawn(shell: &str, term_name: &str, cols: u16, rows: u16) -> Result<Tty> {
        use nix::pty::{forkpty, Winsize};
        use nix::unistd::ForkResult;

        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let fork = unsafe { forkpty(Some(&winsize), None) }.context("forkpty failed")?;
        match fork.fork_result {
            ForkResult::Child => {
                let shell_c = CString::new(shell).unwrap_or_else(|_| CString::new("/bin/sh").unwrap());
                std::env::set_var("TERM", term_name);
                let args = [shell_c.clone()];
                let _ = nix::unistd::execvp(&shell_c, &args);
                unsafe { libc::_exit(127) };
            }
            ForkResult::Parent { child } => {
                let fd = fork.master;
                set_nonblocking(fd)?;
                init_termios(fd);
                Ok(Tty {
                    fd,
                    child,
                    buf: Box::new([0; FD_BUF_SIZE]),
                    start: 0,
                    end: 0,
                    hung: false,
                    printer: Printer::default(),
                })
            }
        }
    }

    /// True once the child exited; the caller closes the window.
    pub fn child_exited(&self) -> bool {
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
        matches!(
            waitpid(self.child, Some(WaitPidFlag::WNOHANG)),
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(_)
        )
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn child(&self) -> nix::unistd::Pid {
        self.child
    }

    pub fn is_hung(&self) -> bool {
        self.hung
    }

    /// Mark the TTY dead; subsequent reads and writes are no-ops.
    pub fn hang(&mut self) {
        if self.fd >= 0 {
            nix::unistd::close(self.fd).ok();
            self.fd = -1;
        }
        self.hung = true;
    }

    pub fn set_winsize(&self, cols: u16, rows: u16, pixel_w: u16, pixel_h: u16) {
        if self.fd < 0 {
            return;
        }
        let ws = libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: pixel_w,
            ws_ypixel: pixel_h,
        };
        unsafe {
            libc::ioctl(self.fd, libc::TIOCSWINSZ, &ws);
        }
    }

    pub fn has_data(&self) -> bool {
        self.start < self.end
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
    }

    /// Pull fresh bytes from the PTY.  The unconsumed tail, padded to
    /// at least the URI look-back window, is preserved at the front of
    /// the buffer.
    pub fn refill(&mut self) -> Result<usize, TtyError> {
        if self.hung || self.fd < 0 {
            return Err(TtyError::HungUp);
        }

        let sz = self.end - self.start;
        if self.start != 0 {
            let tail = sz.max(MAX_PROTOCOL_LEN.min(self.end));
            let from = self.end - tail;
            self.buf.copy_within(from..self.end, 0);
            self.start = tail - sz;
            self.end = tail;
        }

        let mut total = 0usize;
        loop {
            let space = FD_BUF_SIZE - self.end;
            if space == 0 {
                break;
            }
            match nix::unistd::read(self.fd, &mut self.buf[self.end..]) {
                Ok(0) => {
                    if total == 0 {
                        self.hang();
                        return Err(TtyError::Io(io::ErrorKind::UnexpectedEof.into()));
                    }
                    break;
                }
                Ok(n) => {
                    self.end += n;
                    total += n;
                }
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    log::warn!("tty read failed: {}", err);
                    self.hang();
                    return Err(TtyError::Io(io::Error::from_raw_os_error(err as i32)));
                }
            }
        }
        Ok(total)
    }

    fn write_raw(&mut self, mut buf: &[u8]) {
        if self.hung || self.fd < 0 {
            return;
        }
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN | libc::POLLOUT,
            revents: 0,
        };
        let mut lim = TTY_MAX_WRITE;
        while !buf.is_empty() {
            let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    log::warn!("tty poll failed: {}", err);
                    self.hang();
                    return;
                }
                continue;
            }
            if pfd.revents & libc::POLLOUT != 0 {
                match nix::unistd::write(self.fd, &buf[..buf.len().min(lim)]) {
                    Ok(n) if n < buf.len() => buf = &buf[n..],
                    Ok(_) => break,
                    Err(nix::errno::Errno::EAGAIN) | Err(nix::errno::Errno::EINTR) => {}
                    Err(err) => {
                        log::warn!("tty write failed: {}", err);
                        self.hang();
                        return;
                    }
                }
            }
            if pfd.revents & libc::POLLIN != 0 {
                // The child is blocked on its own output; drain it
                // into our buffer to break the deadlock.  When even
                // that buffer is full the reply is dropped: the parser
                // cannot be re-entered from here.
                if self.end - self.start == FD_BUF_SIZE {
                    log::warn!("tty buffer overfull, discarding reply");
                    return;
                }
                lim = self.refill().unwrap_or(TTY_MAX_WRITE).max(1);
            }
            if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                self.hang();
                return;
            }
        }
    }

    /// Write with optional LNM CR -> CR LF translation.
    pub fn write_translated(&mut self, data: &[u8], crlf: bool) {
        if !crlf {
            self.write_raw(data);
            return;
        }
        let mut rest = data;
        while !rest.is_empty() {
            if rest[0] == b'\r' {
                self.write_raw(b"\r\n");
                rest = &rest[1..];
            } else {
                let upto = rest.iter().position(|&b| b == b'\r').unwrap_or(rest.len());
                self.write_raw(&rest[..upto]);
                rest = &rest[upto..];
            }
        }
    }
}

impl Write for Tty {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.hung {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.write_raw(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Tty {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.has_data() {
            self.refill()?;
        }
        let n = out.len().min(self.end - self.start);
        out[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
        self.consume(n);
        Ok(n)
    }
}

impl Drop for Tty {
    fn drop(&mut self) {
        if self.fd >= 0 {
            nix::unistd::close(self.fd).ok();
        }
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    let flags = fcntl(fd, FcntlArg::F_GETFL).context("F_GETFL failed")?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).context("F_SETFL failed")?;
    Ok(())
}

/// Sane line discipline defaults for the fresh PTY.
fn init_termios(fd: RawFd) {
    use termios::*;
    if let Ok(mut tio) = Termios::from_fd(fd) {
        tio.c_iflag = ICRNL | IXON | IXANY | BRKINT;
        tio.c_oflag = OPOST | ONLCR;
        tio.c_lflag = ISIG | ICANON | ECHO | ECHOE | ECHOK | IEXTEN;
        tio.c_cflag = CS8 | CREAD;
        tcsetattr(fd, TCSANOW, &tio).ok();
    }
}

/// Install a process wide SIGCHLD flag; the run loop polls it and
/// hangs up TTYs whose child died.
pub fn watch_sigchld() -> Result<std::sync::Arc<std::sync::atomic::AtomicBool>> {
    let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGCHLD, std::sync::Arc::clone(&flag))
        .context("registering SIGCHLD handler")?;
    Ok(flag)
}

#[cfg(test)]
mod test {
    use super::*;

    struct Collect(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);
    impl Write for Collect {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn printer() -> (Printer, std::rc::Rc<std::cell::RefCell<Vec<u8>>>) {
        let out = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut pr = Printer::default();
        pr.set_sink(Some(Box::new(Collect(out.clone()))));
        pr.enter_controller();
        (pr, out)
    }

    #[test]
    fn controller_passes_data_through() {
        let (mut pr, out) = printer();
        let data = b"hello world";
        assert_eq!(pr.intercept(data), data.len());
        assert!(pr.controller_active());
        assert_eq!(out.borrow().as_slice(), b"hello world");
    }

    #[test]
    fn controller_eats_flow_control() {
        let (mut pr, out) = printer();
        pr.intercept(b"a\x11b\x13c\x00d");
        assert_eq!(out.borrow().as_slice(), b"abcd");
    }

    #[test]
    fn exit_sequence_stops_interception() {
        let (mut pr, out) = printer();
        let data = b"before\x1b[4iafter";
        let eaten = pr.intercept(data);
        assert!(!pr.controller_active());
        assert_eq!(&data[eaten..], b"after");
        assert_eq!(out.borrow().as_slice(), b"before");
    }

    #[test]
    fn nested_enable_is_swallowed() {
        let (mut pr, out) = printer();
        pr.intercept(b"x\x1b[5iy");
        assert!(pr.controller_active());
        assert_eq!(out.borrow().as_slice(), b"xy");
    }
}
