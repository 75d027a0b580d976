//! Ivcap HTTP
//!
//! Everything the SDK sends over the wire goes through the [`HttpClient`]
//! trait. Production code uses [`ReqwestClient`]; tests swap in
//! `testing::MockClient` (behind the `testing` feature) to observe exactly
//! which requests were issued.
//!
//! Request and response bodies are streams of [`Bytes`](bytes::Bytes) so an
//! artifact can be uploaded while it is still being produced, and a
//! downloaded resource can be consumed without buffering it.
//!
//! This crate also owns the SDK-wide [`Error`] taxonomy.

mod client;
mod error;
pub mod headers;
mod message;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{HttpClient, ReqwestClient};
pub use error::{BoxError, Error, RequestInfo, ResponseInfo};
pub use message::{Body, ByteStream, Request, Response};
pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, StatusCode};
