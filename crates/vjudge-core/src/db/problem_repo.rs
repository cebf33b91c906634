//! Problem persistence (spec §3, §4.3, §4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use vjudge_common::{OjName, Problem, ProblemAttributes};

use crate::error::CoreResult;

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Upsert by `(oj_name, problem_id)`, copying recognized attributes and
    /// stamping `last_update` (spec §4.3).
    async fn upsert(
        &self,
        oj_name: &OjName,
        problem_id: &str,
        attrs: &ProblemAttributes,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Problems whose `last_update` is stale (spec §4.5 periodic refresh).
    async fn find_stale(&self, now: DateTime<Utc>) -> CoreResult<Vec<Problem>>;

    /// `(oj_name, max problem_id)` per OJ, for forward-prefetch (spec
    /// §4.5). Only OJs whose current max id integer-parses are returned.
    async fn max_problem_id_per_oj(&self) -> CoreResult<Vec<(OjName, i64)>>;
}

pub struct PgProblemRepository {
    pool: PgPool,
}

impl PgProblemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_problem(row: sqlx::postgres::PgRow) -> sqlx::Result<Problem> {
    let oj_name: String = row.try_get("oj_name")?;
    Ok(Problem {
        oj_name: OjName::from(oj_name),
        problem_id: row.try_get("problem_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        input: row.try_get("input")?,
        output: row.try_get("output")?,
        sample_input: row.try_get("sample_input")?,
        sample_output: row.try_get("sample_output")?,
        time_limit: row.try_get("time_limit")?,
        mem_limit: row.try_get("mem_limit")?,
        last_update: row.try_get("last_update")?,
    })
}

#[async_trait]
impl ProblemRepository for PgProblemRepository {
    async fn upsert(
        &self,
        oj_name: &OjName,
        problem_id: &str,
        attrs: &ProblemAttributes,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"INSERT INTO problems
                 (oj_name, problem_id, title, description, input, output,
                  sample_input, sample_output, time_limit, mem_limit, last_update)
               VALUES ($1, $2, COALESCE($3, ''), COALESCE($4, ''), COALESCE($5, ''),
                       COALESCE($6, ''), COALESCE($7, ''), COALESCE($8, ''),
                       COALESCE($9, 0), COALESCE($10, 0), $11)
               ON CONFLICT (oj_name, problem_id) DO UPDATE SET
                 title = COALESCE($3, problems.title),
                 description = COALESCE($4, problems.description),
                 input = COALESCE($5, problems.input),
                 output = COALESCE($6, problems.output),
                 sample_input = COALESCE($7, problems.sample_input),
                 sample_output = COALESCE($8, problems.sample_output),
                 time_limit = COALESCE($9, problems.time_limit),
                 mem_limit = COALESCE($10, problems.mem_limit),
                 last_update = $11"#,
        )
        .bind(oj_name.as_str())
        .bind(problem_id)
        .bind(&attrs.title)
        .bind(&attrs.description)
        .bind(&attrs.input)
        .bind(&attrs.output)
        .bind(&attrs.sample_input)
        .bind(&attrs.sample_output)
        .bind(attrs.time_limit)
        .bind(attrs.mem_limit)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_stale(&self, now: DateTime<Utc>) -> CoreResult<Vec<Problem>> {
        let rows = sqlx::query(
            r#"SELECT oj_name, problem_id, title, description, input, output,
                      sample_input, sample_output, time_limit, mem_limit, last_update
               FROM problems WHERE $1 - last_update > INTERVAL '24 hours'"#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| row_to_problem(r).map_err(Into::into))
            .collect()
    }

    async fn max_problem_id_per_oj(&self) -> CoreResult<Vec<(OjName, i64)>> {
        let rows = sqlx::query(
            r#"SELECT oj_name, problem_id FROM problems
               WHERE problem_id ~ '^[0-9]+$'"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut maxima: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for row in rows {
            let oj_name: String = row.try_get("oj_name")?;
            let problem_id: String = row.try_get("problem_id")?;
            if let Ok(n) = problem_id.parse::<i64>() {
                maxima
                    .entry(oj_name)
                    .and_modify(|m| *m = (*m).max(n))
                    .or_insert(n);
            }
        }

        Ok(maxima
            .into_iter()
            .map(|(oj, max)| (OjName::from(oj), max))
            .collect())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    pub struct InMemoryProblemRepository {
        rows: Mutex<HashMap<(String, String), Problem>>,
    }

    impl InMemoryProblemRepository {
        pub fn new(seed: Vec<Problem>) -> Self {
            let rows = seed
                .into_iter()
                .map(|p| ((p.oj_name.as_str().to_string(), p.problem_id.clone()), p))
                .collect();
            Self {
                rows: Mutex::new(rows),
            }
        }

        pub async fn get(&self, oj_name: &OjName, problem_id: &str) -> Option<Problem> {
            self.rows
                .lock()
                .await
                .get(&(oj_name.as_str().to_string(), problem_id.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl ProblemRepository for InMemoryProblemRepository {
        async fn upsert(
            &self,
            oj_name: &OjName,
            problem_id: &str,
            attrs: &ProblemAttributes,
            now: DateTime<Utc>,
        ) -> CoreResult<()> {
            let key = (oj_name.as_str().to_string(), problem_id.to_string());
            let mut rows = self.rows.lock().await;
            let entry = rows.entry(key).or_insert_with(|| Problem {
                oj_name: oj_name.clone(),
                problem_id: problem_id.to_string(),
                title: String::new(),
                description: String::new(),
                input: String::new(),
                output: String::new(),
                sample_input: String::new(),
                sample_output: String::new(),
                time_limit: 0,
                mem_limit: 0,
                last_update: now,
            });
            attrs.apply_to(entry);
            entry.last_update = now;
            Ok(())
        }

        async fn find_stale(&self, now: DateTime<Utc>) -> CoreResult<Vec<Problem>> {
            Ok(self
                .rows
                .lock()
                .await
                .values()
                .filter(|p| p.is_stale(now))
                .cloned()
                .collect())
        }

        async fn max_problem_id_per_oj(&self) -> CoreResult<Vec<(OjName, i64)>> {
            let mut maxima: HashMap<String, i64> = HashMap::new();
            for p in self.rows.lock().await.values() {
                if let Ok(n) = p.problem_id.parse::<i64>() {
                    maxima
                        .entry(p.oj_name.as_str().to_string())
                        .and_modify(|m| *m = (*m).max(n))
                        .or_insert(n);
                }
            }
            Ok(maxima.into_iter().map(|(oj, n)| (OjName::from(oj), n)).collect())
        }
    }
}
