//! Member-side synchronization.
//!
//! Each member keeps a versioned local view of the shared session, pulls
//! snapshots from the authority, and corrects its local player when it
//! drifts away from the shared position.

mod client;
mod drift;
mod http_transport;
mod member_view;
mod transport;

pub use client::SyncClient;
pub use drift::{DriftCorrector, DriftDecision};
pub use http_transport::HttpSessionTransport;
pub use member_view::{ApplyOutcome, MemberView};
pub use transport::{InProcessTransport, SessionTransport};
