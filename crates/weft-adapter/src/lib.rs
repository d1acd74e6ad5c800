//! Execution adapters for weft.
//!
//! The scheduler talks to a backing engine only through [`Adapter`].
//! [`with_retry`] is the bounded retry used by adapters for transient
//! failures, and [`ProcessAdapter`] is a reference adapter that runs node
//! payloads with a local shell.

mod adapter;
mod error;
mod process;
mod retry;

pub use adapter::{Adapter, ExecutionRequest, ExecutionResponse};
pub use error::AdapterError;
pub use process::{ProcessAdapter, ProcessAdapterConfig};
pub use retry::{RetryPolicy, with_retry};
