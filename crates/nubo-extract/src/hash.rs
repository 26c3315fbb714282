use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use sha2::{Digest, Sha512};
use tokio::io::{AsyncReadExt, ReadBuf};

/// The base64-encoded SHA-512 of a package archive, as used in `.nupkg.sha512` files.
pub fn content_hash(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(Sha512::digest(bytes))
}

/// An [`tokio::io::AsyncRead`] adapter that computes the SHA-512 of everything read through it.
pub struct HashReader<R> {
    reader: R,
    hasher: Sha512,
}

impl<R> HashReader<R>
where
    R: tokio::io::AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Sha512::new(),
        }
    }

    /// Exhaust the underlying reader.
    pub async fn finish(&mut self) -> Result<(), std::io::Error> {
        while self.read(&mut vec![0; 8192]).await? > 0 {}
        Ok(())
    }

    /// The base64-encoded digest of the bytes read so far.
    pub fn digest(self) -> String {
        BASE64_STANDARD.encode(self.hasher.finalize())
    }
}

impl<R> tokio::io::AsyncRead for HashReader<R>
where
    R: tokio::io::AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let reader = &mut self.reader;
        let filled = buf.filled().len();
        match Pin::new(reader).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                self.hasher.update(&buf.filled()[filled..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
