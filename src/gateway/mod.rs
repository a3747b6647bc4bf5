//! Gateway server implementation

pub mod router;
mod server;

pub use router::{AppState, TOKENS_PATH, create_router};
pub use server::Gateway;
