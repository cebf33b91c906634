//! The `SiteClient` capability contract (spec §6.2).
//!
//! Concrete per-OJ adapters (HDU, SCU, contest variants, ...) are external
//! collaborators (spec §1) and are not implemented here. The dispatch core
//! depends only on this trait, behind a `Box<dyn SiteClient>`, matching the
//! "polymorphic site adapter" design note (spec §9): one interface, many
//! variants behind it, no concrete variant leaking into the core.

use async_trait::async_trait;

use crate::error::JudgeResult;
use crate::types::{ProblemAttributes, SubmitStatus};

/// One authenticated or anonymous session against a single OJ.
///
/// A `SiteClient` is never shared between workers: each `Submitter` and each
/// `StatusCrawler` owns one (spec §3 "Ownership"). Calls are `&mut self`
/// because adapters mutate session state (cookies) on every round trip.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SiteClient: Send {
    /// The OJ identifier this client talks to (e.g. `"hdu"`, `"hdu_ct_42"`).
    fn get_name(&self) -> &str;

    /// The borrowed username, for authenticated clients.
    fn get_user_id(&self) -> JudgeResult<&str>;

    /// Re-authenticate with the credentials supplied at construction.
    async fn login(&mut self, username: &str, password: &str) -> JudgeResult<()>;

    /// Refresh the session using stored credentials (spec §4.1, §4.2 login
    /// recovery path).
    async fn update_cookies(&mut self) -> JudgeResult<()>;

    /// Fetch problem metadata; `Ok(None)` means the OJ has no such problem.
    async fn get_problem(&self, problem_id: &str) -> JudgeResult<Option<ProblemAttributes>>;

    /// Submit source code, returning the OJ-assigned run id.
    async fn submit_problem(
        &mut self,
        problem_id: &str,
        language: &str,
        source_code: &str,
    ) -> JudgeResult<String>;

    /// Poll the OJ for a previously submitted run's status.
    async fn get_submit_status(
        &mut self,
        run_id: &str,
        user_id: &str,
        problem_id: &str,
    ) -> JudgeResult<SubmitStatus>;
}

/// Constructs `SiteClient`s for a given OJ name. This is the factory seam
/// `SubmitterHandler`/`CrawlerHandler` use to start worker groups (spec
/// §4.4); concrete registries (one per real OJ) live outside this crate.
#[async_trait]
pub trait SiteClientFactory: Send + Sync {
    /// Build an authenticated client for `oj_name` using `(username,
    /// password)`. Fails with `JudgeError::LoginError` on bad credentials or
    /// `JudgeError::JudgeException` for any other construction failure.
    async fn authenticated(
        &self,
        oj_name: &str,
        username: &str,
        password: &str,
    ) -> JudgeResult<Box<dyn SiteClient>>;

    /// Build an anonymous client for `oj_name`, used by `ProblemCrawler`.
    async fn anonymous(&self, oj_name: &str) -> JudgeResult<Box<dyn SiteClient>>;
}
