//! Brotli response compression middleware for Tower.
//!
//! This crate provides a Tower layer that compresses HTTP response bodies
//! with Brotli when the client accepts the `br` encoding.
//!
//! # Example
//!
//! ```ignore
//! use tower_brotli::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The decision is made once per response, when the response headers become
//! available. A response is compressed only when all of the following hold:
//! - The request's `Accept-Encoding` header contains the `br` token
//! - The response `Content-Type`, with any parameters stripped, is one of
//!   `application/json`, `image/svg+xml`, `text/css`, `text/html`,
//!   `text/plain`
//! - No `Content-Encoding` header is already set
//!
//! Every other response passes through byte-for-byte with no header changes.
//! When the request does not accept `br` at all, the middleware stays out of
//! the way entirely.
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to `br`
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Vary` header includes `Accept-Encoding`
//!
//! The encoder is finalized when the response body ends, so the last frame
//! of the stream always carries the Brotli trailer; HTTP trailers from the
//! inner body are re-emitted after it.

#![deny(missing_docs)]

mod body;
mod codec;
mod future;
mod layer;
mod service;

pub use body::CompressionBody;
pub use codec::BrotliParams;
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use service::CompressionService;
