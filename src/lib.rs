//! Remote-operation toolkit for SharePoint-style tenant administration.
//!
//! The heart of the crate is the remote HTTP operation framework: an
//! authenticated request/response lifecycle against a target site that
//! shapes each request per the configured authentication strategy, scrapes
//! anti-forgery hidden fields out of served pages, and issues POSTs carrying
//! a freshly fetched request-validation digest. Around it sit connection
//! bootstrap helpers and typed usage-report rows.
//!
//! # Modules
//!
//! - [`auth`] — authentication strategies, per-operation request
//!   configuration, transport shaping, federated credential exchange.
//! - [`connect`] — connection-kind classification and realm discovery.
//! - [`digest`] — request-validation digest envelope and parsing.
//! - [`error`] — typed error hierarchy (`OperationError`).
//! - [`ntlm`] — NTLM message construction for explicit network credentials.
//! - [`operation`] — the `RemoteOperation` trait and `RemoteExecutor`.
//! - [`reports`] — typed tenant usage report rows (CSV/JSON/XML).
//! - [`scrape`] — best-effort hidden-field and literal-tag scraping.
//!
//! # Quick start
//!
//! ```ignore
//! use spo_ops::auth::RemoteOperationRequest;
//! use spo_ops::operation::{PostParameterSet, RemoteExecutor, RemoteOperation};
//!
//! struct SiteSettingsOperation { title: Option<String> }
//!
//! impl RemoteOperation for SiteSettingsOperation {
//!     fn operation_path(&self) -> &str { "/_layouts/settings.aspx" }
//!     fn analyze_response(&mut self, page: &str) -> spo_ops::Result<()> {
//!         self.title = Some(spo_ops::scrape::extract_input_field_by_id(page, "siteTitle"));
//!         Ok(())
//!     }
//!     fn build_post_parameters(&self) -> PostParameterSet {
//!         PostParameterSet::new()
//!     }
//! }
//!
//! let request = RemoteOperationRequest::federated(
//!     "https://tenant.sharepoint.com/sites/ops", "admin@tenant", "secret")?;
//! let executor = RemoteExecutor::new(request);
//! let mut op = SiteSettingsOperation { title: None };
//! let page = executor.execute(&mut op).await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod connect;
pub mod digest;
pub mod error;
pub mod ntlm;
pub mod operation;
pub mod reports;
pub mod scrape;

pub use auth::{AuthKind, RemoteOperationRequest};
pub use error::{OperationError, OperationPhase, Result};
pub use operation::{PostParameterSet, RemoteExecutor, RemoteOperation, TransportLimits};
