//! Form client for the prediction service
//!
//! `form` holds the field state and rendering shared by the headless
//! `predict` command and the desktop window.

pub mod client;
pub mod form;

#[cfg(feature = "desktop-ui")]
pub mod desktop;

pub use client::ApiClient;
pub use form::{PredictForm, Submission};
