//! Serial command transport
//!
//! The host talks to the sequencer over a byte stream carrying ASCII command
//! lines terminated by `\n`, with one binary sub-protocol (`adm`) that reads a
//! fixed number of raw bytes mid-command. [`SerialTransport`] is the narrow
//! interface the protocol engine needs; [`IoTransport`] implements it over any
//! [`embedded_io_async`] stream (a UART on hardware, stdio in the emulator, a
//! mock in tests).
//!
//! # Cancel safety
//!
//! [`IoTransport::read_line`] keeps partially received lines in its own
//! buffer, so dropping the future (for example when a `select` picks another
//! branch) never loses bytes. The next call resumes where the last one
//! stopped.

use embedded_io_async::{Read, Write};
use heapless::Vec;

use crate::config::SERIAL_BUFFER_SIZE;

/// Line-oriented command channel with raw binary reads.
pub trait SerialTransport {
    /// Error type
    type Error: core::fmt::Debug;

    /// Read one line into `buf`, without the terminator.
    ///
    /// Returns the number of bytes written to `buf`. A trailing `\r` is
    /// stripped. Lines longer than `buf` are truncated and the remainder of
    /// the line is discarded.
    fn read_line(
        &mut self,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;

    /// Read exactly `buf.len()` raw bytes.
    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Write all bytes.
    fn write_all(&mut self, data: &[u8])
        -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Discard any buffered input.
    ///
    /// Called after a clock fallback, when in-flight framing may be corrupt.
    fn reinit(&mut self);
}

/// Errors from [`IoTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoTransportError<E> {
    /// The underlying stream failed.
    Io(E),
    /// The underlying stream reported end of input.
    Eof,
}

impl<E: core::fmt::Debug> core::fmt::Display for IoTransportError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "serial I/O error: {e:?}"),
            Self::Eof => f.write_str("serial stream closed"),
        }
    }
}

/// Buffered line framer over an async byte stream.
pub struct IoTransport<T> {
    io: T,
    pending: Vec<u8, SERIAL_BUFFER_SIZE>,
    /// Set when a truncated line was returned and its tail must be skipped.
    discarding: bool,
}

impl<T> IoTransport<T> {
    /// Wrap a byte stream.
    pub const fn new(io: T) -> Self {
        Self {
            io,
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Access the wrapped stream.
    pub fn inner(&self) -> &T {
        &self.io
    }

    /// Mutably access the wrapped stream.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Unwrap, dropping any buffered input.
    pub fn into_inner(self) -> T {
        self.io
    }

    /// Remove the first `n` pending bytes.
    fn consume(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.rotate_left(n);
        self.pending.truncate(self.pending.len().saturating_sub(n));
    }

    /// Copy a completed line of `line_len` pending bytes into `buf`, then drop
    /// it together with `terminator_len` bytes of terminator.
    fn take_line(&mut self, buf: &mut [u8], line_len: usize, terminator_len: usize) -> usize {
        let mut len = line_len;
        if terminator_len > 0 && self.pending.get(..len).and_then(<[u8]>::last) == Some(&b'\r') {
            len = len.saturating_sub(1);
        }
        let copied = len.min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..copied), self.pending.get(..copied)) {
            dst.copy_from_slice(src);
        }
        self.consume(line_len.saturating_add(terminator_len));
        copied
    }
}

impl<T: Read + Write> IoTransport<T> {
    /// Pull more bytes from the stream into the pending buffer.
    async fn fill(&mut self) -> Result<(), IoTransportError<T::Error>> {
        let mut chunk = [0u8; 64];
        let room = self.pending.capacity().saturating_sub(self.pending.len());
        let want = room.min(chunk.len());
        let dst = chunk.get_mut(..want).unwrap_or_default();
        let n = self.io.read(dst).await.map_err(IoTransportError::Io)?;
        if n == 0 {
            return Err(IoTransportError::Eof);
        }
        let got = dst.get(..n).unwrap_or_default();
        // `want` never exceeds the free space, so this cannot fail.
        let _ = self.pending.extend_from_slice(got);
        Ok(())
    }
}

impl<T: Read + Write> SerialTransport for IoTransport<T> {
    type Error = IoTransportError<T::Error>;

    async fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                if self.discarding {
                    self.discarding = false;
                    self.consume(pos.saturating_add(1));
                    continue;
                }
                return Ok(self.take_line(buf, pos, 1));
            }

            if self.pending.is_full() {
                if self.discarding {
                    self.pending.clear();
                } else {
                    // No terminator in a full buffer: hand back what we have.
                    let len = self.pending.len();
                    self.discarding = true;
                    return Ok(self.take_line(buf, len, 0));
                }
            }

            self.fill().await?;
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let buffered = self.pending.len().min(buf.len());
        let (head, tail) = buf.split_at_mut(buffered);
        if let Some(src) = self.pending.get(..buffered) {
            head.copy_from_slice(src);
        }
        self.consume(buffered);

        self.io.read_exact(tail).await.map_err(|e| match e {
            embedded_io::ReadExactError::UnexpectedEof => IoTransportError::Eof,
            embedded_io::ReadExactError::Other(e) => IoTransportError::Io(e),
        })
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.io.write_all(data).await.map_err(IoTransportError::Io)?;
        self.io.flush().await.map_err(IoTransportError::Io)
    }

    fn reinit(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::mocks::MockSerialPort;

    fn transport(input: &[u8]) -> IoTransport<MockSerialPort> {
        let mut port = MockSerialPort::with_max_chunk(5);
        port.push_input(input);
        IoTransport::new(port)
    }

    #[tokio::test]
    async fn splits_lines_and_strips_carriage_return() {
        let mut t = transport(b"ver\r\nset 0 1 5\n");
        let mut buf = [0u8; 64];

        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ver");
        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"set 0 1 5");
        assert_eq!(t.read_line(&mut buf).await, Err(IoTransportError::Eof));
    }

    #[tokio::test]
    async fn empty_line_reads_as_zero_length() {
        let mut t = transport(b"\n\r\n");
        let mut buf = [0u8; 8];
        assert_eq!(t.read_line(&mut buf).await.unwrap(), 0);
        assert_eq!(t.read_line(&mut buf).await.unwrap(), 0);
    }

    /// An over-long line comes back truncated and its tail is skipped, so the
    /// next read starts on the following line.
    #[tokio::test]
    async fn overlong_line_is_truncated_and_tail_discarded() {
        let mut input = vec![b'x'; SERIAL_BUFFER_SIZE + 40];
        input.extend_from_slice(b"\nsts\n");
        let mut t = transport(&input);
        let mut buf = [0u8; SERIAL_BUFFER_SIZE];

        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(n, SERIAL_BUFFER_SIZE);
        assert!(buf.iter().all(|&b| b == b'x'));
        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"sts");
    }

    #[tokio::test]
    async fn short_caller_buffer_truncates_single_line() {
        let mut t = transport(b"abcdefgh\nnext\n");
        let mut buf = [0u8; 4];
        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abcd");
        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"next");
    }

    /// Bytes that arrived together with a command line are served first by the
    /// following raw read.
    #[tokio::test]
    async fn read_exact_drains_buffered_bytes_first() {
        let mut t = IoTransport::new(MockSerialPort::new());
        t.inner_mut().push_input(b"adm 0 1\n\x01\x00\x0a\x00\x00\x00ver\n");
        let mut line = [0u8; 32];
        let n = t.read_line(&mut line).await.unwrap();
        assert_eq!(&line[..n], b"adm 0 1");

        let mut record = [0u8; 6];
        t.read_exact(&mut record).await.unwrap();
        assert_eq!(record, [1, 0, 10, 0, 0, 0]);

        let n = t.read_line(&mut line).await.unwrap();
        assert_eq!(&line[..n], b"ver");
    }

    #[tokio::test]
    async fn read_exact_reports_eof_on_short_input() {
        let mut t = transport(b"\x01\x02");
        let mut record = [0u8; 6];
        assert_eq!(t.read_exact(&mut record).await, Err(IoTransportError::Eof));
    }

    #[tokio::test]
    async fn reinit_discards_partial_input() {
        let mut t = IoTransport::new(MockSerialPort::new());
        t.inner_mut().push_input(b"garb");
        let mut buf = [0u8; 16];
        // Partial line is buffered, then the stream reports end of input.
        assert_eq!(t.read_line(&mut buf).await, Err(IoTransportError::Eof));

        t.reinit();
        t.inner_mut().push_input(b"sts\n");
        let n = t.read_line(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"sts");
    }

    #[tokio::test]
    async fn write_all_reaches_stream() {
        let mut t = transport(b"");
        t.write_all(b"ok\r\n").await.unwrap();
        assert_eq!(t.inner_mut().take_output_string(), "ok\r\n");
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let mut t = transport(b"");
        t.inner_mut().fail_writes(true);
        assert!(matches!(t.write_all(b"ok").await, Err(IoTransportError::Io(_))));
    }
}
