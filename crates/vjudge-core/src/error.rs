//! Errors for the core's own plumbing (persistence, queues), distinct from
//! `vjudge_common::JudgeError`, which is the `SiteClient` contract's error
//! set (spec §7).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    RedisPool(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
