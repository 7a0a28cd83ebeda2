//! Verification flow core.
//!
//! Pure lifecycle and artifact semantics live here, behind repository
//! traits; the HTTP layer in `crate::api` and the storage backends plug in
//! at the seams. The engine never talks to the network or sends mail
//! itself, it returns the email that must be dispatched.

pub mod account;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod memory;
pub mod outcome;
pub mod postgres;
pub mod redirect;
pub mod repo;
pub mod status;
pub mod variant;

pub use account::Account;
pub use artifact::{Purpose, SecretKind};
pub use config::FlowConfig;
pub use engine::{ConsumeRequest, FlowEngine, IssueRequest, normalize_email};
pub use outcome::{ConsumeOutcome, IssueOutcome, PeekOutcome};
pub use redirect::RedirectContext;
pub use status::AccountStatus;
pub use variant::FlowVariant;
