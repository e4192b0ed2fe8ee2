pub mod app;
pub mod authz;
pub mod db;
pub mod docs;
pub mod errors;
pub mod jwt;
pub mod locks;
pub mod models;
pub mod quota;
pub mod routes;
pub mod services;
pub mod upload;
pub mod utils;

// Re-export commonly used items for tests
pub use app::{build_router, create_app, AppState};
