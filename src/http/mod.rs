//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request id, timeout, body limit)
//!     → pipeline.rs (composed stages)
//!     → handler.rs (terminal handler)
//!     → writer.rs (decorated writers → buffered response)
//!     → Send to client
//! ```

pub mod body;
pub mod compression;
pub mod handler;
pub mod pipeline;
pub mod server;
pub mod settings;
pub mod writer;

pub use handler::{EchoHandler, Handler};
pub use pipeline::{compose, Pipeline, PipelineKeys};
pub use server::HttpServer;
pub use settings::PipelineSettings;
pub use writer::{BufferedResponse, ResponseWriter};
