//! Submission persistence (spec §3, §6.3).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use vjudge_common::{OjName, Submission, SubmissionId, Verdict};

use crate::error::CoreResult;
use crate::metrics;

/// Terminal verdicts, used to guard against overwriting a finished
/// submission (spec §8 invariant 2).
const TERMINAL_DB_STRS: &[&str] = &[
    "Accepted",
    "Wrong Answer",
    "Time Limit Exceeded",
    "Memory Limit Exceeded",
    "Runtime Error",
    "Compile Error",
    "Presentation Error",
    "Submit Failed",
    "Judge Failed",
    "Judge Timeout",
];

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn find_by_id(&self, id: SubmissionId) -> CoreResult<Option<Submission>>;

    /// Submissions still eligible for (re-)dispatch, for crash recovery
    /// (spec §4.4 startup scan, §5 "Restart semantics").
    async fn find_non_terminal_ids(&self) -> CoreResult<Vec<SubmissionId>>;

    /// Submitter step 4 success path: stamp `run_id`/`user_id` and move to
    /// `Being Judged` (spec §3 invariant 1: both are set together).
    async fn mark_being_judged(
        &self,
        id: SubmissionId,
        run_id: &str,
        user_id: &str,
    ) -> CoreResult<()>;

    /// Commit a terminal verdict with execution metrics. No-ops (without
    /// error) if the row is already terminal, enforcing spec §8 invariant
    /// 2 at the persistence layer.
    async fn commit_terminal(
        &self,
        id: SubmissionId,
        verdict: Verdict,
        exe_time: Option<i64>,
        exe_mem: Option<i64>,
    ) -> CoreResult<()>;
}

pub struct PgSubmissionRepository {
    pool: PgPool,
}

impl PgSubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_submission(row: sqlx::postgres::PgRow) -> sqlx::Result<Submission> {
    let verdict_str: String = row.try_get("verdict")?;
    let verdict = Verdict::from_db_str(&verdict_str).unwrap_or(Verdict::JudgeFailed);
    let oj_name: String = row.try_get("oj_name")?;

    Ok(Submission {
        id: row.try_get("id")?,
        oj_name: OjName::from(oj_name),
        problem_id: row.try_get("problem_id")?,
        language: row.try_get("language")?,
        source_code: row.try_get("source_code")?,
        user_id: row.try_get("user_id")?,
        run_id: row.try_get("run_id")?,
        verdict,
        exe_time: row.try_get("exe_time")?,
        exe_mem: row.try_get("exe_mem")?,
        time_stamp: row.try_get("time_stamp")?,
    })
}

#[async_trait]
impl SubmissionRepository for PgSubmissionRepository {
    async fn find_by_id(&self, id: SubmissionId) -> CoreResult<Option<Submission>> {
        let row = sqlx::query(
            r#"SELECT id, oj_name, problem_id, language, source_code, user_id, run_id,
                      verdict, exe_time, exe_mem, time_stamp
               FROM submissions WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_submission).transpose().map_err(Into::into)
    }

    async fn find_non_terminal_ids(&self) -> CoreResult<Vec<SubmissionId>> {
        let rows = sqlx::query(
            r#"SELECT id FROM submissions WHERE verdict IN ('Queuing', 'Being Judged')"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.try_get::<SubmissionId, _>("id").map_err(Into::into))
            .collect()
    }

    async fn mark_being_judged(
        &self,
        id: SubmissionId,
        run_id: &str,
        user_id: &str,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"UPDATE submissions
               SET run_id = $2, user_id = $3, verdict = 'Being Judged'
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(run_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn commit_terminal(
        &self,
        id: SubmissionId,
        verdict: Verdict,
        exe_time: Option<i64>,
        exe_mem: Option<i64>,
    ) -> CoreResult<()> {
        debug_assert!(verdict.is_terminal(), "commit_terminal called with non-terminal verdict");

        let result = sqlx::query(
            r#"UPDATE submissions
               SET verdict = $2, exe_time = $3, exe_mem = $4
               WHERE id = $1 AND verdict != ALL($5)"#,
        )
        .bind(id)
        .bind(verdict.to_db_str())
        .bind(exe_time)
        .bind(exe_mem)
        .bind(TERMINAL_DB_STRS)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            metrics::record_verdict(verdict.to_db_str());
        }

        Ok(())
    }
}
