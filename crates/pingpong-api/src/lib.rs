pub mod handlers;
pub mod router;

pub use router::{ApiState, DEFAULT_MAX_BODY_BYTES, api_router};
