pub mod api;
pub mod camera;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod feed;
pub mod plate;
pub mod report;
pub mod session;
pub mod types;

pub use error::{Error, Result};
