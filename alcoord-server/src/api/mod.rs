//! HTTP and websocket handlers

pub mod annotation;
pub mod health;
pub mod status;
pub mod ws;

pub use annotation::{annotate, next_instance};
pub use health::health_routes;
pub use status::project_status;
pub use ws::model_socket;
