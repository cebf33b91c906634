//! SubmitterHandler (spec §4.4): bridges the durable submit queue and
//! per-OJ `Submitter`s, launching worker groups lazily and retiring them
//! when idle.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use vjudge_common::{AccountTable, OjName, SiteClientFactory, SubmissionId, Verdict};

use crate::config::PolicyConfig;
use crate::db::SubmissionRepository;
use crate::mem_queue::MemQueue;
use crate::queue::DurableQueue;
use crate::workers::status_crawler::StatusCrawlerHandle;
use crate::workers::submitter::Submitter;

struct SubmitterEntry {
    stop_flag: Arc<std::sync::atomic::AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

struct Group {
    queue: MemQueue<SubmissionId>,
    submitters: HashMap<String, SubmitterEntry>,
    start_time: DateTime<Utc>,
}

pub struct SubmitterHandler {
    durable_queue: Arc<dyn DurableQueue>,
    repo: Arc<dyn SubmissionRepository>,
    accounts: AccountTable,
    factory: Arc<dyn SiteClientFactory>,
    policy: PolicyConfig,
    groups: AsyncMutex<HashMap<OjName, Group>>,
}

impl SubmitterHandler {
    pub fn new(
        durable_queue: Arc<dyn DurableQueue>,
        repo: Arc<dyn SubmissionRepository>,
        accounts: AccountTable,
        factory: Arc<dyn SiteClientFactory>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            durable_queue,
            repo,
            accounts,
            factory,
            policy,
            groups: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Replays persisted non-terminal submissions onto the durable queue
    /// (spec §4.4 "Startup", §5 "Restart semantics").
    pub async fn recover_on_startup(&self) {
        match self.repo.find_non_terminal_ids().await {
            Ok(ids) => {
                for id in ids {
                    if let Err(e) = self.durable_queue.push(&id.to_string()).await {
                        tracing::warn!(id, error = %e, "failed to replay submission onto durable queue");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "startup recovery scan failed"),
        }
    }

    /// Main loop (spec §4.4 "Main loop").
    pub async fn run(&self) {
        self.recover_on_startup().await;

        let poll_timeout = Duration::from_secs(self.policy.submit_handler_poll_timeout_secs);
        let reap_interval =
            chrono::Duration::seconds(self.policy.idle_reap_interval_secs as i64);
        let mut last_reap = Utc::now();

        loop {
            if Utc::now() - last_reap > reap_interval {
                self.clean_free_submitters().await;
                last_reap = Utc::now();
            }

            match self.durable_queue.blocking_pop(poll_timeout).await {
                Ok(Some(payload)) => self.handle_payload(&payload).await,
                Ok(None) => continue,
                Err(e) => tracing::error!(error = %e, "durable submit queue pop failed"),
            }
        }
    }

    async fn handle_payload(&self, payload: &str) {
        let Ok(id) = payload.trim().parse::<SubmissionId>() else {
            tracing::warn!(payload, "corrupt submit queue payload, dropping");
            return;
        };

        let submission = match self.repo.find_by_id(id).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::warn!(id, "submission id not found, dropping");
                return;
            }
            Err(e) => {
                tracing::error!(id, error = %e, "failed to load submission");
                return;
            }
        };

        let oj_name = submission.oj_name.clone();
        let mut groups = self.groups.lock().await;

        if !groups.contains_key(&oj_name) {
            match self.start_group(&oj_name).await {
                Some(group) => {
                    groups.insert(oj_name.clone(), group);
                }
                None => {
                    drop(groups);
                    let _ = self
                        .repo
                        .commit_terminal(id, Verdict::SubmitFailed, None, None)
                        .await;
                    return;
                }
            }
        }

        if let Some(group) = groups.get(&oj_name) {
            group.queue.push(id);
        }
    }

    /// Starts a submitter group for OJ `O` (spec §4.4 "Starting a submitter
    /// group"). Returns `None` if no account or every client construction
    /// failed.
    async fn start_group(&self, oj_name: &OjName) -> Option<Group> {
        let Some(accounts) = self.accounts.accounts_for(oj_name) else {
            tracing::warn!(%oj_name, "no accounts configured for this OJ");
            return None;
        };

        let queue: MemQueue<SubmissionId> = MemQueue::new();
        let mut submitters = HashMap::new();

        for account in accounts {
            let submit_client = match self
                .factory
                .authenticated(oj_name.as_str(), &account.username, &account.password)
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(%oj_name, user = %account.username, error = %e, "failed to construct submit client");
                    continue;
                }
            };
            let status_client = match self
                .factory
                .authenticated(oj_name.as_str(), &account.username, &account.password)
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(%oj_name, user = %account.username, error = %e, "failed to construct status client");
                    continue;
                }
            };

            let status_handle = StatusCrawlerHandle::start(
                oj_name.clone(),
                status_client,
                self.repo.clone(),
                self.policy.clone(),
            );
            status_handle.wait_start().await;

            let submitter = Submitter::new(
                account.username.clone(),
                submit_client,
                queue.clone(),
                self.repo.clone(),
                status_handle,
                self.policy.clone(),
            );
            let stop_flag = submitter.stop_handle();
            let join = tokio::spawn(submitter.run());

            submitters.insert(account.username.clone(), SubmitterEntry { stop_flag, join });
        }

        if submitters.is_empty() {
            tracing::warn!(%oj_name, "no submitter could be started for this OJ");
            return None;
        }

        tracing::info!(%oj_name, count = submitters.len(), "started submitter group");
        Some(Group {
            queue,
            submitters,
            start_time: Utc::now(),
        })
    }

    /// `clean_free_submitters` (spec §4.4 "Idle reaping"). Any group older
    /// than `idle_reap_interval_secs` is torn down; the actual stop+join is
    /// done off the main loop so the reaper never blocks dispatch.
    async fn clean_free_submitters(&self) {
        let idle_after = chrono::Duration::seconds(self.policy.idle_reap_interval_secs as i64);
        let now = Utc::now();

        let stale: Vec<OjName> = {
            let groups = self.groups.lock().await;
            groups
                .iter()
                .filter(|(_, g)| now - g.start_time > idle_after)
                .map(|(oj, _)| oj.clone())
                .collect()
        };

        let mut groups = self.groups.lock().await;
        for oj in stale {
            if let Some(group) = groups.remove(&oj) {
                tracing::info!(%oj, "reaping idle submitter group");
                tokio::spawn(async move {
                    for entry in group.submitters.values() {
                        entry.stop_flag.store(true, Ordering::SeqCst);
                    }
                    for (_, entry) in group.submitters {
                        let _ = entry.join.await;
                    }
                });
            }
        }
    }

    /// Retries starting groups for every configured OJ that has no running
    /// group (supplemented behavior: the original re-scans hourly for OJs
    /// that failed to start at boot due to bad credentials).
    pub async fn retry_unavailable_ojs(&self) {
        let all_ojs: Vec<OjName> = self
            .accounts
            .normal_accounts
            .keys()
            .chain(self.accounts.contest_accounts.keys())
            .map(|s| OjName::from(s.clone()))
            .collect();

        for oj_name in all_ojs {
            let already_running = self.groups.lock().await.contains_key(&oj_name);
            if already_running {
                continue;
            }
            if let Some(group) = self.start_group(&oj_name).await {
                self.groups.lock().await.insert(oj_name, group);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::submission_repo::test_support::InMemorySubmissionRepository;
    use crate::queue::test_support::InMemoryQueue;
    use async_trait::async_trait;
    use vjudge_common::{Account, JudgeResult, MockSiteClient, Submission, Verdict};

    struct StubFactory;

    #[async_trait]
    impl SiteClientFactory for StubFactory {
        async fn authenticated(
            &self,
            oj_name: &str,
            _username: &str,
            _password: &str,
        ) -> JudgeResult<Box<dyn vjudge_common::SiteClient>> {
            let mut mock = MockSiteClient::new();
            mock.expect_get_name().return_const(oj_name.to_string());
            Ok(Box::new(mock))
        }

        async fn anonymous(&self, _oj_name: &str) -> JudgeResult<Box<dyn vjudge_common::SiteClient>> {
            Ok(Box::new(MockSiteClient::new()))
        }
    }

    fn submission(id: SubmissionId, oj: &str) -> Submission {
        Submission {
            id,
            oj_name: OjName::from(oj),
            problem_id: "1000".into(),
            language: "G++".into(),
            source_code: "int main(){}".into(),
            user_id: None,
            run_id: None,
            verdict: Verdict::Queuing,
            exe_time: None,
            exe_mem: None,
            time_stamp: chrono::Utc::now(),
        }
    }

    fn accounts_with_hdu() -> AccountTable {
        let mut table = AccountTable::default();
        table.normal_accounts.insert(
            "hdu".to_string(),
            vec![Account {
                username: "acct1".into(),
                password: "pw".into(),
            }],
        );
        table
    }

    #[tokio::test]
    async fn unsupported_oj_commits_submit_failed() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![submission(
            1, "unknown",
        )]));
        let durable = Arc::new(InMemoryQueue::new());
        let handler = SubmitterHandler::new(
            durable,
            repo.clone(),
            AccountTable::default(),
            Arc::new(StubFactory),
            PolicyConfig::default(),
        );

        handler.handle_payload("1").await;

        assert_eq!(repo.get(1).await.unwrap().verdict, Verdict::SubmitFailed);
    }

    #[tokio::test]
    async fn corrupt_payload_is_dropped_without_commit() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![]));
        let durable = Arc::new(InMemoryQueue::new());
        let handler = SubmitterHandler::new(
            durable,
            repo,
            AccountTable::default(),
            Arc::new(StubFactory),
            PolicyConfig::default(),
        );

        handler.handle_payload("not-a-number").await;
        // No panic, no repository access attempted beyond the parse.
    }

    #[tokio::test]
    async fn known_oj_lazily_starts_group_and_queues_id() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![submission(2, "hdu")]));
        let durable = Arc::new(InMemoryQueue::new());
        let handler = SubmitterHandler::new(
            durable,
            repo.clone(),
            accounts_with_hdu(),
            Arc::new(StubFactory),
            PolicyConfig::default(),
        );

        handler.handle_payload("2").await;

        // The group was created and the submission routed into it; give
        // the spawned submitter a tick to drain and submit.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handler.groups.lock().await.contains_key(&OjName::from("hdu")));
    }
}
