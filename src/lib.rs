pub mod config;
pub mod control;
pub mod geometry;
pub mod model_download;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;
