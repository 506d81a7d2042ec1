use crate::body::CompressionBody;
use crate::codec::{self, BrotliParams};
use http::{Response, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Content types eligible for compression.
///
/// Matching is exact on the media type after stripping parameters; absent or
/// unknown types are never compressed.
const COMPRESSIBLE_TYPES: [&str; 5] = [
    "application/json",
    "image/svg+xml",
    "text/css",
    "text/html",
    "text/plain",
];

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        params: Option<BrotliParams>,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, params: Option<BrotliParams>) -> Self {
        Self { inner, params }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response = wrap_response(response, this.params.take());
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Wraps the response body, compressing it if the response qualifies.
///
/// Runs exactly once per response, when the headers become available and
/// before any body frame is produced. `params` is `None` when the client did
/// not accept the br encoding.
fn wrap_response<B>(
    response: Response<B>,
    params: Option<BrotliParams>,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    let params = params.filter(|_| {
        is_compressible_content_type(&parts.headers)
            && !parts.headers.contains_key(header::CONTENT_ENCODING)
    });

    let body = if let Some(params) = params {
        let always_flush = wants_eager_flush(&parts.headers);

        // Remove Content-Length since the compressed size is unknown
        parts.headers.remove(header::CONTENT_LENGTH);

        parts.headers.insert(
            header::CONTENT_ENCODING,
            header::HeaderValue::from_static(codec::ENCODING),
        );

        add_vary_accept_encoding(&mut parts.headers);

        CompressionBody::compressed(body, params, always_flush)
    } else {
        CompressionBody::passthrough(body)
    };

    Response::from_parts(parts, body)
}

/// Checks if the response content type is in the compressible set.
fn is_compressible_content_type(headers: &header::HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    // Strip parameters such as "; charset=utf-8"
    let essence = content_type
        .split_once(';')
        .map_or(content_type, |(essence, _)| essence);

    COMPRESSIBLE_TYPES.contains(&essence)
}

/// Adds Accept-Encoding to the Vary header if not already covered.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary) = vary.to_str() {
            let covered = vary.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

/// Checks for `X-Accel-Buffering: no`, which asks the encoder to flush after
/// every chunk instead of holding compressed output back.
fn wants_eager_flush(headers: &header::HeaderMap) -> bool {
    headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
}
