//! # Registry Server
//!
//! A private npm registry core focused on safe version removal.
//!
//! - [`revision_store`]: package documents under optimistic concurrency
//! - [`blob`]: tarball storage with idempotent, retried deletes
//! - [`unpublish`]: the metadata-first unpublish workflow
//! - [`auth`]: caller classification; only administrators unpublish
//! - [`policy`]: the live tarball removal switch
//! - [`npm`], [`server`]: HTTP surface

pub mod auth;
pub mod blob;
pub mod cli;
pub mod config;
pub mod error;
pub mod npm;
pub mod policy;
pub mod revision_store;
pub mod server;
pub mod state;
pub mod types;
pub mod unpublish;
pub mod validation;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use server::{build_router, run_server};
pub use state::AppState;
pub use unpublish::{UnpublishError, UnpublishOutcome, UnpublishRequest, Unpublisher};
