use crate::codec::BrotliParams;
use crate::service::CompressionService;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies with Brotli.
///
/// The layer owns the encoder parameters; they are fixed at construction
/// time and shared read-only by every request passing through the wrapped
/// service.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    params: BrotliParams,
}

impl CompressionLayer {
    /// Creates a new compression layer with default encoder parameters.
    pub fn new() -> Self {
        Self {
            params: BrotliParams::default(),
        }
    }

    /// Sets the encoder parameters used for every compressed response.
    pub fn params(mut self, params: BrotliParams) -> Self {
        self.params = params;
        self
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.params.clone())
    }
}
