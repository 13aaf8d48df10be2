pub mod disposition;
pub mod fetch;
pub mod redact;
pub mod session;

pub use fetch::{fetch_all_to_dir, Fetch, FetchIdentity, FetchOutcome, FetchStatus};
pub use session::{FetchSession, SessionConfig, API_KEY_HEADER, CORRELATION_HEADER};
