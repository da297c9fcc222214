pub mod common;
pub mod health;
pub mod live;
pub mod notifications;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod sessions;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
