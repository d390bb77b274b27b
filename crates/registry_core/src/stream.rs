use core::pin::Pin;
use core::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::stream::Stream;
use hyper::body::Body;
use pin_project::pin_project;

const CHUNK_SIZE: usize = 6 * 1024 * 1024; // 6 MB

/// Turn a [`hyper::body::Body`] into a stream of fixed-size [`bytes::Bytes`].
///
/// Wrapper around [`hyper::body::Body`] that buffers and re-streams the underlying stream bytes
/// into fixed size chunks of bytes.
#[pin_project]
pub struct ChunkedBody {
    body: Body,
    buffer: BytesMut,
}

impl ChunkedBody {
    pub fn from_body(body: Body) -> ChunkedBody {
        ChunkedBody {
            body,
            buffer: BytesMut::with_capacity(CHUNK_SIZE),
        }
    }
}

impl Stream for ChunkedBody {
    type Item = std::result::Result<Bytes, Box<dyn std::error::Error + Send + Sync + 'static>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match Pin::new(this.body).poll_next(cx) {
            Poll::Ready(Some(Ok(mut bytes))) => {
                let remaining = CHUNK_SIZE - this.buffer.len();
                if bytes.len() < remaining {
                    this.buffer.extend_from_slice(&bytes);
                    return Poll::Pending;
                }
                if bytes.len() == remaining {
                    this.buffer.extend_from_slice(&bytes);
                    let buf = this.buffer.split();
                    return Poll::Ready(Some(Ok(buf.freeze())));
                } else {
                    let exact = bytes.split_to(remaining);
                    this.buffer.extend_from_slice(&exact);
                    let buf = this.buffer.split();
                    this.buffer.extend_from_slice(&bytes);
                    return Poll::Ready(Some(Ok(buf.freeze())));
                }
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Box::new(e)))),
            Poll::Ready(None) => {
                if this.buffer.len() > 0 {
                    let buf = this.buffer.split();
                    return Poll::Ready(Some(Ok(buf.freeze())));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
