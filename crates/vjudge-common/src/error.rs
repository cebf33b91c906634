//! Error taxonomy shared by every `SiteClient` adapter and the dispatch core.
//!
//! These map onto spec §7's abstract error kinds; the core never matches on
//! concrete adapter exception types, only on these variants.

use thiserror::Error;

/// Failure kinds a `SiteClient` call can surface (spec §7).
#[derive(Error, Debug)]
pub enum JudgeError {
    /// Transport failure talking to the OJ.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The authenticated session has lapsed and needs a fresh login.
    #[error("login expired")]
    LoginExpired,

    /// Credentials were rejected.
    #[error("login error: {0}")]
    LoginError(String),

    /// An authenticated operation was attempted on an anonymous client.
    #[error("login required for this operation")]
    LoginRequired,

    /// The OJ rejected the submission itself (bad language, contest not
    /// running, captcha exhausted, ...).
    #[error("submit error: {0}")]
    SubmitError(String),

    /// Generic adapter failure raised during client construction or problem
    /// refresh; logged and the worker attempt is skipped.
    #[error("judge exception: {0}")]
    JudgeException(String),
}

/// Result alias used throughout the core.
pub type JudgeResult<T> = Result<T, JudgeError>;
