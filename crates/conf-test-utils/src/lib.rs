//! Shared test utilities for the layered configuration workspace.
//!
//! A dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`layers`]: [`TestLayers`] temp-dir fixture for the file layers and
//!   engine settings
//! - [`remote`]: [`ScriptedRemote`], a `RemoteSource` that replays queued
//!   responses

pub mod layers;
pub mod remote;

pub use layers::TestLayers;
pub use remote::ScriptedRemote;
