// Ordering core
pub mod orders;
pub mod pricing;

// Dining sessions
pub mod sessions;

// Payments
pub mod payments;
pub mod reconciler;

// Staff notifications
pub mod notifications;
