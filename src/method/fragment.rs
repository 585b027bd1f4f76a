use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

const RECORD_HEADER_LEN: usize = 5;
const HANDSHAKE_CONTENT_TYPE: u8 = 0x16;

/// How the ClientHello is split on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragmentation {
    /// Largest write handed to the socket while fragmenting.
    pub chunk_size: usize,
    /// Pause between two fragments.
    pub delay: Duration,
}

impl Default for Fragmentation {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            delay: Duration::from_millis(5),
        }
    }
}

/// Splits the first TLS record written (the ClientHello, and the SNI in it)
/// into small, spaced-out writes. Everything after that record passes
/// through untouched, so later handshake messages and requests carry no
/// added delay.
pub struct FragmentedStream<S> {
    inner: S,
    plan: Fragmentation,
    /// Bytes of the first record still to fragment; `None` until the first write.
    remaining: Option<usize>,
    pause: Option<Pin<Box<Sleep>>>,
}

impl<S> FragmentedStream<S> {
    pub fn new(inner: S, plan: Fragmentation) -> Self {
        Self {
            inner,
            plan,
            remaining: None,
            pause: None,
        }
    }
}

/// Length of the record starting at `buf`, header included. Without a
/// handshake record header only the bytes of this write are covered.
fn first_record_len(buf: &[u8]) -> usize {
    match buf {
        [HANDSHAKE_CONTENT_TYPE, _, _, hi, lo, ..] => {
            RECORD_HEADER_LEN + usize::from(u16::from_be_bytes([*hi, *lo]))
        }
        _ => buf.len(),
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for FragmentedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for FragmentedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        let remaining = *this.remaining.get_or_insert_with(|| first_record_len(buf));
        if remaining == 0 {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        if let Some(pause) = this.pause.as_mut() {
            ready!(pause.as_mut().poll(cx));
            this.pause = None;
        }

        let limit = buf.len().min(this.plan.chunk_size.max(1)).min(remaining);
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, &buf[..limit]))?;
        let remaining = remaining - written;
        this.remaining = Some(remaining);

        if written > 0 && remaining > 0 && !this.plan.delay.is_zero() {
            this.pause = Some(Box::pin(tokio::time::sleep(this.plan.delay)));
        }
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
