pub mod handlers;
pub mod response;
pub mod server;
pub mod tenant;

pub use handlers::{ApiError, AppState};
pub use server::{build_router, run_server};
pub use tenant::Tenant;
