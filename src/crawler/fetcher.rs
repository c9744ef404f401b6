//! Page fetcher interface.
//!
//! The crawler is agnostic to how listing pages are retrieved and parsed.
//! A [`SessionFactory`] acquires one shared [`FetchSession`] per crawl (an
//! HTTP client, a browser process, a fixture set); every worker fetches its
//! pages through that session concurrently.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{FetchError, SessionError};

use super::record::{PageNumber, RawJobRecord};

/// A live fetch session shared read-only by all workers of one crawl.
#[async_trait]
pub trait FetchSession: Send + Sync {
    /// Fetches one listing page and returns the raw records found on it.
    ///
    /// Implementations must not touch shared crawl state and must enforce
    /// their own per-page timeout if they need one.
    async fn fetch_page(&self, page: PageNumber) -> Result<Vec<RawJobRecord>, FetchError>;

    /// Releases the resources held by the session.
    ///
    /// Called exactly once by the orchestrator after every worker stopped.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Acquires fetch sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn FetchSession>, SessionError>;
}
