//! Fetch, verify and install engine shared by every installer in the mcprep
//! toolkit.
//!
//! Three subsystems do the heavy lifting: an async HTTP fetch engine with
//! typed sinks and skip-if-unchanged semantics, a manifest-based
//! reconciliation protocol that makes installs idempotent, and multi-
//! algorithm hash verification gating artifact acceptance. Provider clients
//! (Paper, Fabric, CurseForge, ...) sit on top of this crate and are not
//! part of it.

pub mod cache;
pub mod error;
pub mod http;
pub mod install;
pub mod manifest;
pub mod util;
pub mod verify;

pub use cache::ResponseCache;
pub use error::{PrepError, Result};
pub use http::{
    fetch_all_to_dir, Fetch, FetchIdentity, FetchOutcome, FetchSession, FetchStatus, SessionConfig,
};
pub use install::{install, InstallOutcome};
pub use manifest::{InstallDecision, Manifest, Origin};
pub use util::block_on;
pub use verify::{HashAlgorithm, HashSpec};
