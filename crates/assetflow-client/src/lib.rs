//! HTTP client for the remote 3D generation API.
//!
//! Provides:
//! - Authenticated JSON requests with linear-backoff retry on HTTP 429
//! - Progress streaming over server-sent events until a terminal status
//! - Status polling as an alternative to streaming
//! - Unauthenticated artifact downloads
//!
//! The [`GenerationApi`] trait is the seam the pipeline engine depends on.

pub mod api;
pub mod client;
pub mod error;
pub mod retry;
pub mod sse;
pub mod types;

pub use api::GenerationApi;
pub use client::{ClientBuilder, DEFAULT_BASE_URL, GenerationClient};
pub use error::{ApiError, Result};
pub use types::{TaskErrorDetail, TaskRecord, TaskStatus};
