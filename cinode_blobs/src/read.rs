//! Decrypting reader adapter.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use cinode_core::KeystreamCipher;
use tokio::io::{AsyncRead, ReadBuf};

/// Applies a keystream to everything read from the inner reader.
///
/// The keystream position advances with the bytes delivered, so the
/// adapter is only correct for sequential reads from offset zero.
pub(crate) struct DecryptingReader<R> {
    inner: R,
    cipher: Box<dyn KeystreamCipher>,
}

impl<R> DecryptingReader<R> {
    pub(crate) fn new(inner: R, cipher: Box<dyn KeystreamCipher>) -> Self {
        Self { inner, cipher }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DecryptingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let pre = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let filled = buf.filled_mut();
                if let Err(err) = this.cipher.apply_keystream(&mut filled[pre..]) {
                    return Poll::Ready(Err(io::Error::other(err)));
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
