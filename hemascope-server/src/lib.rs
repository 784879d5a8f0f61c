pub mod config_manager;
pub mod context;
pub mod http;

pub use context::{AppContext, AppContextBuilder};
pub use http::{create_router, ApiError, ErrorResponse, SharedContext};
