use crate::codec::{self, BrotliParams};
use crate::future::ResponseFuture;
use http::Request;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that compresses HTTP response bodies with Brotli.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    params: BrotliParams,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    pub fn new(inner: S, params: BrotliParams) -> Self {
        Self { inner, params }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Clients that do not accept br get the response untouched.
        let params = codec::accepts_brotli(req.headers()).then(|| self.params.clone());

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, params)
    }
}

#[cfg(test)]
mod tests {
    use crate::CompressionLayer;
    use bytes::{Buf, Bytes};
    use http::header::{ACCEPT_ENCODING, HeaderValue};
    use http::{Request, Response, header};
    use http_body::Body;
    use http_body_util::Full;
    use std::convert::Infallible;
    use std::future::Future;
    use std::io::Read;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tower::{Layer, Service, service_fn};

    async fn html_handler(_req: Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .header(header::CONTENT_LENGTH, "13")
            .body(Full::new(Bytes::from("<html></html>")))
            .unwrap();
        Ok(response)
    }

    async fn png_handler(_req: Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "image/png")
            .header(header::CONTENT_LENGTH, "8")
            .body(Full::new(Bytes::from_static(b"\x89PNG\r\n\x1a\n")))
            .unwrap();
        Ok(response)
    }

    fn request(accept_encoding: Option<&'static str>) -> Request<()> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = accept_encoding {
            builder = builder.header(ACCEPT_ENCODING, HeaderValue::from_static(value));
        }
        builder.body(()).unwrap()
    }

    fn resolve<F: Future>(future: F) -> F::Output {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Box::pin(future).as_mut().poll(&mut cx) {
            Poll::Ready(output) => output,
            Poll::Pending => panic!("future did not resolve"),
        }
    }

    fn collect_body<B>(mut body: B) -> Vec<u8>
    where
        B: Body + Unpin,
        B::Data: Buf,
        B::Error: std::fmt::Debug,
    {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        let mut collected = Vec::new();
        loop {
            match Pin::new(&mut body).poll_frame(&mut cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if let Ok(mut data) = frame.into_data() {
                        while data.has_remaining() {
                            let chunk = data.chunk();
                            collected.extend_from_slice(chunk);
                            data.advance(chunk.len());
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => panic!("body error: {e:?}"),
                Poll::Ready(None) => break,
                Poll::Pending => panic!("body did not resolve"),
            }
        }
        collected
    }

    fn decompress(data: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::new();
        brotli::Decompressor::new(data, 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    #[test]
    fn test_compresses_html_response() {
        let mut service = CompressionLayer::new().layer(service_fn(html_handler));

        let response = resolve(service.call(request(Some("br")))).unwrap();
        let (parts, body) = response.into_parts();

        assert_eq!(parts.headers.get(header::CONTENT_ENCODING).unwrap(), "br");
        assert!(parts.headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(
            parts.headers.get(header::VARY).unwrap(),
            "accept-encoding"
        );
        assert_eq!(decompress(&collect_body(body)), b"<html></html>");
    }

    #[test]
    fn test_bypasses_when_encoding_not_accepted() {
        let mut service = CompressionLayer::new().layer(service_fn(html_handler));

        let response = resolve(service.call(request(Some("gzip, deflate")))).unwrap();
        let (parts, body) = response.into_parts();

        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
        assert!(parts.headers.get(header::VARY).is_none());
        assert_eq!(parts.headers.get(header::CONTENT_LENGTH).unwrap(), "13");
        assert_eq!(collect_body(body), b"<html></html>");
    }

    #[test]
    fn test_bypasses_without_accept_encoding() {
        let mut service = CompressionLayer::new().layer(service_fn(html_handler));

        let response = resolve(service.call(request(None))).unwrap();
        let (parts, body) = response.into_parts();

        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(collect_body(body), b"<html></html>");
    }

    #[test]
    fn test_passes_through_png_response() {
        let mut service = CompressionLayer::new().layer(service_fn(png_handler));

        let response = resolve(service.call(request(Some("br")))).unwrap();
        let (parts, body) = response.into_parts();

        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
        assert!(parts.headers.get(header::VARY).is_none());
        assert_eq!(parts.headers.get(header::CONTENT_LENGTH).unwrap(), "8");
        assert_eq!(collect_body(body), b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_custom_params_round_trip() {
        let layer = CompressionLayer::new().params(crate::BrotliParams::default());
        let mut service = layer.layer(service_fn(html_handler));

        let response = resolve(service.call(request(Some("br")))).unwrap();
        let (parts, body) = response.into_parts();

        assert_eq!(parts.headers.get(header::CONTENT_ENCODING).unwrap(), "br");
        assert_eq!(decompress(&collect_body(body)), b"<html></html>");
    }
}
