//! Registration service client.
//!
//! [`DocumentClient`] ties the admission gate to the collaborators that do
//! the actual work: a [`Transport`] for HTTP exchanges, a [`Serializer`] for
//! payloads and a [`CredentialSource`] for the bearer token.

mod classify;
mod client;
mod credentials;
mod document;
mod pipeline;
mod serializer;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{classify_authentication, classify_submission};
pub use client::DocumentClient;
pub use credentials::{CredentialSource, SharedToken};
pub use document::{AuthRequest, AuthResponse, Description, Document, Product};
pub use pipeline::{SubmissionPipeline, SubmissionReceipt, SubmissionRequest, SubmitOptions};
pub use serializer::{JsonSerializer, SerializationError, Serializer};
pub use transport::{
    HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError,
    TransportErrorKind,
};
