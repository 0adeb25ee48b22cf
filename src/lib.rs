//! Forms Client Library
//!
//! An async client for the REST API of a forms and workflow platform:
//! form records, file attachments and whole applications.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`query`] - Record filters, sorting and paging, rendered as a query string
//! - [`http`] - Authenticated connections, multipart uploads and response dispatch
//! - [`client`] - [`FormsClient`] and the platform operations built on `http`
//! - [`json`] - Typed accessors over the schema-less record JSON
//! - [`config`] - Connection settings
//! - [`error`] - The [`ApiError`] type shared by every operation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod json;
pub mod query;
mod user_agent;

// Re-export commonly used types
pub use client::{
    ArchiveTarget, DeleteOutcome, DeleteReport, DeleteSubject, FormsClient,
};
pub use config::{ConnectionConfig, DEFAULT_CONTEXT, DEFAULT_RELAXED_PROTOCOL, TlsMode};
pub use error::ApiError;
pub use http::{
    AttachmentStream, Body, MediaTypes, ResultEnvelope, ReturnFormat, XmlElement, XmlNode,
};
pub use json::JsonObject;
pub use query::{
    DEFAULT_PAGE_SIZE, FilterOperator, FilterPredicate, FilterSet, MetaColumn, Relation,
    SortOrder, build_query_string,
};
