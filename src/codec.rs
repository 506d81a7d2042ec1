use compression_codecs::EncodeV2;
use compression_codecs::brotli::BrotliEncoder;
use http::HeaderMap;

/// Brotli encoder parameters.
///
/// Owned by [`CompressionLayer`](crate::CompressionLayer) and shared by every
/// response; use the builder methods on this type to tune the encoder before
/// handing it to the layer.
pub use compression_codecs::brotli::params::EncoderParams as BrotliParams;

/// The Content-Encoding token this middleware negotiates and produces.
pub(crate) const ENCODING: &str = "br";

/// Checks whether the request advertises the br encoding.
///
/// This is a substring check on the Accept-Encoding value; quality values
/// are not interpreted.
pub(crate) fn accepts_brotli(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(ENCODING))
}

/// Creates a streaming encoder for one response.
pub(crate) fn encoder(params: BrotliParams) -> Box<dyn EncodeV2 + Send> {
    Box::new(BrotliEncoder::new(params))
}
