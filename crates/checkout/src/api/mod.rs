//! JSON:API client layer.
//!
//! # Architecture
//!
//! - [`transport`] - HTTP seam; production uses `reqwest`, tests script fakes
//! - [`pipeline`] - bearer/CSRF attachment and single-flight 401 recovery
//! - [`document`] - typed JSON:API compound-document model
//! - [`convert`] - boundary conversions from wire resources to domain types
//!
//! The backend is the source of truth for every checkout mutation; nothing
//! in this layer caches writable state.

pub mod convert;
pub mod document;
pub mod pipeline;
pub mod transport;

pub use document::ApiDocument;
pub use pipeline::{IdentityProvider, RequestPipeline};
pub use transport::{ReqwestTransport, Transport, TransportError};
