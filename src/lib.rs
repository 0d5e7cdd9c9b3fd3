pub mod aliases;
pub mod config;
pub mod error;
pub mod geometry;
pub mod join;
pub mod pipeline;
pub mod projection;
pub mod render;
pub mod server;
pub mod tabular;
pub mod types;

pub use error::PipelineError;
