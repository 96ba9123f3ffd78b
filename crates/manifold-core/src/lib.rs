//! # Manifold Core
//!
//! Core types for the Manifold router/dispatcher framework.
//!
//! This crate provides the foundational value types shared by every other
//! Manifold crate:
//!
//! - [`Request`] - An inbound request: method, path segments, query map,
//!   headers, optional body, and a monotonic abort flag
//! - [`Response`] - The mutable response accumulator with its merge reducer
//! - [`Content`] - Tagged union over the response payload kinds
//! - [`ShutdownSignal`] - Cooperative cancellation token passed into dispatch
//! - [`source`] - The consumed data-source contract (channels, time series)

#![doc(html_root_url = "https://docs.rs/manifold-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod request;
mod response;
mod shutdown;
pub mod source;

pub use error::{Cancelled, DispatchResult};
pub use request::{Method, Request};
pub use response::{Content, Response};
pub use shutdown::ShutdownSignal;
