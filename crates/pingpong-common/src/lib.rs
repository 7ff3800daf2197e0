pub mod error;
pub mod time;

pub use error::{PingpongError, Result};
