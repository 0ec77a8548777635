// HTTP API for token management

pub mod tokens;

pub use tokens::{create_token_router, TokenAppState};
