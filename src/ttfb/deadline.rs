use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::probe::context::{ContextError, ProbeContext};

type Expiry = Pin<Box<dyn Future<Output = ContextError> + Send>>;

/// Borrows a connection and fails its reads and writes once the context is done.
///
/// The deadline lives in the wrapper, not in the connection: when the wrapper
/// is dropped the connection goes back to its owner with nothing attached.
pub struct DeadlineStream<'a, C: ?Sized> {
    inner: &'a mut C,
    expiry: Expiry,
    expired: Option<ContextError>,
}

impl<'a, C: ?Sized> DeadlineStream<'a, C> {
    pub fn new(inner: &'a mut C, ctx: &ProbeContext) -> Self {
        let ctx = ctx.clone();
        Self {
            inner,
            expiry: Box::pin(async move { ctx.done().await }),
            expired: None,
        }
    }

    pub fn get_ref(&self) -> &C {
        &*self.inner
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Option<io::Error> {
        if self.expired.is_none() {
            if let Poll::Ready(reason) = self.expiry.as_mut().poll(cx) {
                self.expired = Some(reason);
            }
        }
        self.expired
            .map(|reason| io::Error::new(io::ErrorKind::TimedOut, reason))
    }
}

impl<C: AsyncRead + Unpin + ?Sized> AsyncRead for DeadlineStream<'_, C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_expired(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut *this.inner).poll_read(cx, buf)
    }
}

impl<C: AsyncWrite + Unpin + ?Sized> AsyncWrite for DeadlineStream<'_, C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_expired(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut *this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_expired(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut *this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}
