pub mod config;
pub mod errors;
pub mod generator;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod worker;

pub use config::Config;
pub use router::app_router;
pub use state::AppState;
