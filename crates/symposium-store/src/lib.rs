//! # symposium-store
//!
//! Document and blob storage for the Symposium collaboration platform.
//!
//! The platform keeps all durable state in a hosted, schemaless document
//! database.  This crate exposes that collaborator as an explicitly
//! constructed [`DocStore`] handle: collections of JSON documents with
//! per-document CRUD, compound queries with cursor pagination, atomic
//! multi-document write batches (with server timestamps, counter increments
//! and array union/removal applied at commit time), and live watch channels
//! that re-deliver the full current snapshot on every underlying change.
//!
//! Attachments live in a separate [`BlobStore`]: bytes go in under a
//! caller-qualified key, a durable `blob:/` retrieval URL comes out.

pub mod batch;
pub mod blobs;
pub mod document;
pub mod docstore;
pub mod query;
pub mod watch;

mod error;

pub use batch::WriteBatch;
pub use blobs::BlobStore;
pub use document::{Document, FieldOp};
pub use docstore::DocStore;
pub use error::{Result, StoreError};
pub use query::{Direction, Query};
pub use watch::Subscription;
