//! Policy: membership rules and lease parameters.

mod lease;
mod rules;

pub use lease::LeasePolicy;
pub use rules::{Assessment, EXEMPT_CATEGORIES, PurgePolicy, Violation};
