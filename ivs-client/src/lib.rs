//! ivs-client - client for the used instrument valuation service
//!
//! [`ApiClient`] speaks HTTP/SSE to `ivs-api`; [`AppraisalSession`] drives
//! the two phases on top of it, keeping a [`StreamState`] that only ever
//! reflects the latest request of each phase.

pub mod error;
pub mod http;
pub mod progress;
pub mod session;
pub mod state;

pub use error::ClientError;
pub use http::{ApiClient, EventStream, ImageFile, PhaseRequest, ValuationBackend};
pub use session::{AppraisalSession, SessionOptions};
pub use state::{Generation, PhaseStatus, PhaseView, StreamState};
