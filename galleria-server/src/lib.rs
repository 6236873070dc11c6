//! Galleria Server - HTTP routing layer over the catalog engine

pub mod config;
pub mod server;

pub use config::Config;
pub use server::{MAX_IMAGE_BYTES, ServerState, build_engine, router, run_server};
