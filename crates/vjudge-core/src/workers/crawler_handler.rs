//! CrawlerHandler (spec §4.5): bridges the durable problem queue and
//! per-OJ `ProblemCrawler`s, analogous to `SubmitterHandler`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use vjudge_common::{OjName, SiteClientFactory};

use crate::config::PolicyConfig;
use crate::db::ProblemRepository;
use crate::mem_queue::MemQueue;
use crate::queue::DurableQueue;
use crate::workers::problem_crawler::ProblemCrawler;

/// Problem-queue payload shape (spec §6.1, §4.5).
#[derive(Debug, Deserialize)]
struct CrawlPayload {
    #[serde(rename = "type")]
    kind: String,
    oj_name: String,
    problem_id: Option<String>,
    #[serde(default)]
    all: bool,
}

struct CrawlerEntry {
    queue: MemQueue<String>,
    #[allow(dead_code)]
    stop_flag: Arc<AtomicBool>,
    #[allow(dead_code)]
    join: tokio::task::JoinHandle<()>,
}

pub struct CrawlerHandler {
    durable_queue: Arc<dyn DurableQueue>,
    problem_repo: Arc<dyn ProblemRepository>,
    factory: Arc<dyn SiteClientFactory>,
    policy: PolicyConfig,
    crawlers: tokio::sync::Mutex<HashMap<OjName, CrawlerEntry>>,
}

impl CrawlerHandler {
    pub fn new(
        durable_queue: Arc<dyn DurableQueue>,
        problem_repo: Arc<dyn ProblemRepository>,
        factory: Arc<dyn SiteClientFactory>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            durable_queue,
            problem_repo,
            factory,
            policy,
            crawlers: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Main loop. A durable-pop timeout is the periodic-refresh trigger
    /// (spec §4.5 "Periodic refresh").
    pub async fn run(&self) {
        let poll_timeout = Duration::from_secs(self.policy.crawl_handler_poll_timeout_secs);

        loop {
            match self.durable_queue.blocking_pop(poll_timeout).await {
                Ok(Some(payload)) => self.handle_payload(&payload).await,
                Ok(None) => self.periodic_refresh().await,
                Err(e) => tracing::error!(error = %e, "durable problem queue pop failed"),
            }
        }
    }

    async fn handle_payload(&self, payload: &str) {
        let parsed: CrawlPayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(payload, error = %e, "malformed problem queue payload, dropping");
                return;
            }
        };

        if parsed.kind != "problem" {
            tracing::debug!(kind = %parsed.kind, "reserved problem queue payload type, dropping");
            return;
        }
        if parsed.all {
            tracing::debug!(oj_name = %parsed.oj_name, "bulk-refresh payload not supported, dropping");
            return;
        }
        let Some(problem_id) = parsed.problem_id else {
            tracing::warn!(oj_name = %parsed.oj_name, "problem payload missing problem_id, dropping");
            return;
        };

        let oj_name = OjName::from(parsed.oj_name);
        self.enqueue_for_oj(&oj_name, problem_id).await;
    }

    async fn enqueue_for_oj(&self, oj_name: &OjName, problem_id: String) {
        let mut crawlers = self.crawlers.lock().await;
        if !crawlers.contains_key(oj_name) {
            match self.spawn_crawler(oj_name).await {
                Some(entry) => {
                    crawlers.insert(oj_name.clone(), entry);
                }
                None => return,
            }
        }
        if let Some(entry) = crawlers.get(oj_name) {
            entry.queue.push(problem_id);
        }
    }

    async fn spawn_crawler(&self, oj_name: &OjName) -> Option<CrawlerEntry> {
        let client = match self.factory.anonymous(oj_name.as_str()).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%oj_name, error = %e, "failed to construct anonymous client");
                return None;
            }
        };

        let queue: MemQueue<String> = MemQueue::new();
        let crawler = ProblemCrawler::new(
            oj_name.clone(),
            client,
            queue.clone(),
            self.problem_repo.clone(),
            Duration::from_secs(self.policy.submitter_dequeue_timeout_secs),
        );
        let stop_flag = crawler.stop_flag();
        let join = tokio::spawn(crawler.run());

        tracing::info!(%oj_name, "started problem crawler");
        Some(CrawlerEntry {
            queue,
            stop_flag,
            join,
        })
    }

    /// Stale-refresh and forward-prefetch (spec §4.5 "Periodic refresh").
    async fn periodic_refresh(&self) {
        let now = chrono::Utc::now();

        match self.problem_repo.find_stale(now).await {
            Ok(stale) => {
                for problem in stale {
                    self.enqueue_for_oj(&problem.oj_name, problem.problem_id).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to list stale problems"),
        }

        match self.problem_repo.max_problem_id_per_oj().await {
            Ok(maxima) => {
                for (oj_name, max_id) in maxima {
                    for offset in 1..=self.policy.prefetch_window as i64 {
                        self.enqueue_for_oj(&oj_name, (max_id + offset).to_string()).await;
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to compute forward-prefetch ids"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::problem_repo::test_support::InMemoryProblemRepository;
    use crate::queue::test_support::InMemoryQueue;
    use async_trait::async_trait;
    use vjudge_common::{JudgeResult, MockSiteClient, SiteClient};

    struct StubFactory;

    #[async_trait]
    impl SiteClientFactory for StubFactory {
        async fn authenticated(
            &self,
            _oj_name: &str,
            _username: &str,
            _password: &str,
        ) -> JudgeResult<Box<dyn SiteClient>> {
            Ok(Box::new(MockSiteClient::new()))
        }

        async fn anonymous(&self, oj_name: &str) -> JudgeResult<Box<dyn SiteClient>> {
            let mut mock = MockSiteClient::new();
            mock.expect_get_name().return_const(oj_name.to_string());
            mock.expect_get_problem().returning(|_| Ok(None));
            Ok(Box::new(mock))
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let handler = CrawlerHandler::new(
            Arc::new(InMemoryQueue::new()),
            Arc::new(InMemoryProblemRepository::new(vec![])),
            Arc::new(StubFactory),
            PolicyConfig::default(),
        );
        handler.handle_payload("not json").await;
        assert!(handler.crawlers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn reserved_type_is_dropped() {
        let handler = CrawlerHandler::new(
            Arc::new(InMemoryQueue::new()),
            Arc::new(InMemoryProblemRepository::new(vec![])),
            Arc::new(StubFactory),
            PolicyConfig::default(),
        );
        handler
            .handle_payload(r#"{"type":"contest","oj_name":"hdu"}"#)
            .await;
        assert!(handler.crawlers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn problem_payload_spawns_crawler_and_queues_id() {
        let handler = CrawlerHandler::new(
            Arc::new(InMemoryQueue::new()),
            Arc::new(InMemoryProblemRepository::new(vec![])),
            Arc::new(StubFactory),
            PolicyConfig::default(),
        );
        handler
            .handle_payload(r#"{"type":"problem","oj_name":"hdu","problem_id":"1000"}"#)
            .await;
        assert!(handler.crawlers.lock().await.contains_key(&OjName::from("hdu")));
    }
}
