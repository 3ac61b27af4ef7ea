//! Remote calls to the search backend: a timeout, a bounded retry loop and
//! cooperative cancellation around a pluggable transport.

mod api;
mod client;
mod transport;
mod types;

pub use api::{ApiClient, SearchBackend};
pub use client::RemoteClient;
pub use transport::{HttpTransport, Transport};
pub use types::{base_url, CallError, Method, RawResponse, RemoteRequest};
