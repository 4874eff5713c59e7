//! Domain model: member rows, action candidates, queues, leases.
//!
//! Pure data and the merge rules between cycles. Nothing here locks, sleeps
//! or performs I/O; the only outward call is the live registration check,
//! which goes through the registry port.

pub mod candidate;
pub mod errors;
pub mod feed_time;
pub mod ids;
pub mod lease;
pub mod member;
pub mod queue;
pub mod stats;

pub use candidate::{ActionCandidate, CandidateView, RegistrationCheck};
pub use errors::{ErrorKind, RegistryError, SnapshotError, StoreError};
pub use ids::MemberId;
pub use lease::LeaseToken;
pub use member::{MemberRecord, Snapshot};
pub use queue::{ActionQueue, UnknownQueue};
pub use stats::RosterStats;
