//! Shared types, errors, and the `SiteClient` contract for the VJudge core.

pub mod error;
pub mod site_client;
pub mod types;

pub use error::{JudgeError, JudgeResult};
pub use site_client::{SiteClient, SiteClientFactory};
pub use types::*;

#[cfg(any(test, feature = "mock"))]
pub use site_client::MockSiteClient;
