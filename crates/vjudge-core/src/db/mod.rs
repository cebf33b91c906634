//! Persistence repositories (spec §3, §6.3). No schema/migrations are
//! defined by the core; only the record shapes and access patterns are.

pub mod problem_repo;
pub mod submission_repo;

pub use problem_repo::{PgProblemRepository, ProblemRepository};
pub use submission_repo::{PgSubmissionRepository, SubmissionRepository};
