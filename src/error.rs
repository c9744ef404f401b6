//! Error types for crawl operations.
//!
//! Defines the error taxonomy shared by the crawler subsystems:
//! - Page fetching (recoverable, scoped to one page)
//! - Fetch session lifecycle (acquisition and teardown)
//! - Whole-crawl failures surfaced to the caller
//!
//! Records rejected by validation are not errors and have no variant here.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while fetching or parsing a single listing page.
///
/// A `FetchError` never aborts a crawl: the worker that hit it logs it,
/// counts the page as failed and moves on to the next page number.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Listing page returned HTTP {code}")]
    Status { code: u16 },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse listing page: {0}")]
    Parse(String),

    #[error("No listing items found on page {page}")]
    NoListings { page: u32 },
}

impl FetchError {
    /// Returns true when retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) | FetchError::Timeout(_) => true,
            FetchError::Status { code } => *code >= 500 || *code == 429,
            FetchError::Parse(_) | FetchError::NoListings { .. } => false,
        }
    }
}

/// Errors raised by the shared fetch session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to open fetch session: {0}")]
    Open(String),

    #[error("Failed to close fetch session: {0}")]
    Close(String),
}

/// Errors that fail a crawl as a whole.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid crawl configuration: {0}")]
    InvalidConfig(String),

    #[error("Session acquisition failed: {0}")]
    SessionAcquisition(#[source] SessionError),
}
