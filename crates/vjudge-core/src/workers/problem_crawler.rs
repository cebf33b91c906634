//! ProblemCrawler (spec §4.3): one per OJ, drains a per-OJ in-memory
//! problem-refresh queue and upserts problem metadata.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vjudge_common::{JudgeError, OjName, SiteClient};

use crate::db::ProblemRepository;
use crate::mem_queue::MemQueue;

pub struct ProblemCrawler {
    oj_name: OjName,
    client: Box<dyn SiteClient>,
    queue: MemQueue<String>,
    repo: Arc<dyn ProblemRepository>,
    stop_flag: Arc<AtomicBool>,
    dequeue_timeout: Duration,
}

impl ProblemCrawler {
    pub fn new(
        oj_name: OjName,
        client: Box<dyn SiteClient>,
        queue: MemQueue<String>,
        repo: Arc<dyn ProblemRepository>,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            oj_name,
            client,
            queue,
            repo,
            stop_flag: Arc::new(AtomicBool::new(false)),
            dequeue_timeout,
        }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Single crawler per OJ means at-most-one concurrent refresh; no
    /// per-problem locking is needed (spec §4.3 "Guarantee").
    pub async fn run(mut self) {
        while !self.stop_flag.load(Ordering::SeqCst) {
            match self.queue.pop(self.dequeue_timeout).await {
                Some(problem_id) => self.refresh(&problem_id).await,
                None => continue,
            }
        }
    }

    async fn refresh(&mut self, problem_id: &str) {
        let attrs = match self.client.get_problem(problem_id).await {
            Ok(Some(attrs)) => attrs,
            Ok(None) => return,
            Err(JudgeError::ConnectionError(_)) => return,
            Err(_) => return,
        };

        let _ = self
            .repo
            .upsert(&self.oj_name, problem_id, &attrs, chrono::Utc::now())
            .await;
    }
}
