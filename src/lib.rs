pub mod config;
pub mod error;
pub mod image;
pub mod link;
pub mod printer;
pub mod proto;
pub mod server;

pub use error::{Error, Result};
