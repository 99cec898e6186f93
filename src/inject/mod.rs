// src/inject/mod.rs

//! Streaming content injection.
//!
//! [`InjectingReader`] wraps an [`AsyncRead`] and splices a fixed string in
//! front of the first occurrence of a marker (by default `</body>`), without
//! buffering the whole body. A few trailing bytes of every chunk are held
//! back whenever they could be the start of a marker that continues in the
//! next read.
//!
//! - [`script`] holds the live-reload client snippet injected into HTML
//!   responses.

pub mod script;

use std::cmp;
use std::fmt;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::Stream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

pub use script::{BODY_END_MARKER, RELOAD_SCRIPT};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectError {
    #[error("inject: buffer is too small, need at least {need} bytes, got {got}")]
    BufferTooSmall { need: usize, got: usize },
}

/// Reader that inserts `content` immediately before the first `marker`.
///
/// Reads must offer at least `marker.len()` bytes of buffer space; smaller
/// reads fail with [`io::ErrorKind::InvalidInput`] and leave the reader
/// untouched. One instance serves exactly one stream.
pub struct InjectingReader<R> {
    inner: R,
    marker: Vec<u8>,
    content: Vec<u8>,
    /// Tail bytes that might begin a marker split across reads.
    carry: Vec<u8>,
    /// Bytes already decided on, waiting for buffer space.
    out: Vec<u8>,
    out_pos: usize,
    scratch: Vec<u8>,
    injected: bool,
    at_eof: bool,
}

impl<R> fmt::Debug for InjectingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectingReader")
            .field("marker", &String::from_utf8_lossy(&self.marker))
            .field("carry", &self.carry.len())
            .field("pending", &(self.out.len() - self.out_pos))
            .field("injected", &self.injected)
            .field("at_eof", &self.at_eof)
            .finish_non_exhaustive()
    }
}

impl<R> InjectingReader<R> {
    /// Inject `content` before the closing body tag.
    pub fn new(inner: R, content: impl Into<Vec<u8>>) -> Self {
        Self::with_marker(inner, BODY_END_MARKER, content)
    }

    pub fn with_marker(
        inner: R,
        marker: impl Into<Vec<u8>>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            inner,
            marker: marker.into(),
            content: content.into(),
            carry: Vec::new(),
            out: Vec::new(),
            out_pos: 0,
            scratch: Vec::new(),
            injected: false,
            at_eof: false,
        }
    }

    /// Smallest read buffer this reader accepts.
    pub fn min_read_len(&self) -> usize {
        self.marker.len()
    }

    /// Whether the insertion has already been spliced into the output.
    pub fn is_injected(&self) -> bool {
        self.injected
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Drive the reader as a stream of chunks.
    ///
    /// Every read is offered a fresh buffer of `chunk_len` bytes (never less
    /// than the marker), so the minimum-buffer contract always holds.
    pub fn into_chunks(self, chunk_len: usize) -> impl Stream<Item = io::Result<Vec<u8>>> + Send
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = cmp::max(chunk_len, self.min_read_len());
        futures::stream::try_unfold(self, move |mut reader| async move {
            let mut chunk = vec![0u8; len];
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            chunk.truncate(n);
            Ok(Some((chunk, reader)))
        })
    }

    /// Decide what to do with `data` (carry-over followed by fresh bytes).
    fn absorb(&mut self, mut data: Vec<u8>) {
        debug_assert!(self.out_pos == self.out.len());

        if self.injected {
            self.out = data;
            self.out_pos = 0;
            return;
        }

        if let Some(i) = find(&data, &self.marker) {
            let mut spliced = Vec::with_capacity(data.len() + self.content.len());
            spliced.extend_from_slice(&data[..i]);
            spliced.extend_from_slice(&self.content);
            spliced.extend_from_slice(&data[i..]);
            self.out = spliced;
            self.out_pos = 0;
            self.injected = true;
            return;
        }

        let window = self.marker.len() + 1;
        let split = data.len().saturating_sub(window);
        if let Some(first) = self.marker.first() {
            if data[split..].contains(first) {
                self.carry = data.split_off(split);
            }
        }

        self.out = data;
        self.out_pos = 0;
    }
}

impl<R> AsyncRead for InjectingReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let want = buf.remaining();

        if want < this.marker.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                InjectError::BufferTooSmall {
                    need: this.marker.len(),
                    got: want,
                },
            )));
        }

        loop {
            if this.out_pos < this.out.len() {
                let n = cmp::min(want, this.out.len() - this.out_pos);
                buf.put_slice(&this.out[this.out_pos..this.out_pos + n]);
                this.out_pos += n;
                if this.out_pos == this.out.len() {
                    this.out.clear();
                    this.out_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if this.at_eof {
                return Poll::Ready(Ok(()));
            }

            this.scratch.resize(want, 0);
            let mut fresh = ReadBuf::new(&mut this.scratch);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut fresh))?;
            let n = fresh.filled().len();

            if n == 0 {
                // The held-back tail can no longer complete a marker.
                this.at_eof = true;
                this.out = mem::take(&mut this.carry);
                this.out_pos = 0;
                continue;
            }

            let mut data = mem::take(&mut this.carry);
            data.extend_from_slice(&this.scratch[..n]);
            this.absorb(data);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
