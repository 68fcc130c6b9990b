//! Pomelo checkout workflow engine.
//!
//! Drives a resumable, multi-step checkout against a JSON:API commerce
//! backend: billing and shipping addresses, shipping and payment method
//! selection, review, and payment execution. Sessions survive restarts
//! through debounced snapshot persistence and recover transparently from
//! expired access tokens via a single-flight refresh in the request
//! pipeline.
//!
//! The embedding application supplies an [`api::pipeline::IdentityProvider`]
//! for tokens and a [`persist::SnapshotBackend`] for storage; everything
//! else is wired from [`config::CommerceConfig`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address_book;
pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod machine;
pub mod persist;
pub mod session;
pub mod totals;

pub use address_book::AddressBook;
pub use api::pipeline::{IdentityProvider, RequestPipeline};
pub use api::transport::{ReqwestTransport, Transport};
pub use config::CommerceConfig;
pub use error::{CheckoutError, Result};
pub use executor::CheckoutStepExecutor;
pub use machine::{
    AdvanceOutcome, BackOutcome, CheckoutStateMachine, SessionInit, StepEvent, StepState,
    Transition,
};
pub use persist::{FileBackend, MemoryBackend, SnapshotBackend, SnapshotStore, SystemClock};
pub use session::{
    AddressSelection, CheckoutSession, LineItem, SessionSnapshot, SourceList,
};
pub use totals::Totals;
