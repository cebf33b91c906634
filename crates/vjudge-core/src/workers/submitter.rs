//! Submitter (spec §4.1): drains one per-OJ in-memory submit queue and
//! dispatches each submission to the OJ.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use vjudge_common::{JudgeError, SiteClient, SubmissionId, Verdict};

use crate::config::PolicyConfig;
use crate::db::SubmissionRepository;
use crate::mem_queue::MemQueue;
use crate::workers::status_crawler::StatusCrawlerHandle;

/// Tracks `LoginExpired` re-enqueue counts per submission id, since the
/// in-memory queue payload carries no extra state (spec §9: "add a bounded
/// retry count"). Shared across every `Submitter` draining the same per-OJ
/// queue so a retried id is bounded no matter which submitter picks it up
/// next.
type LoginRetryCounts = Arc<AsyncMutex<HashMap<SubmissionId, u32>>>;

pub struct Submitter {
    user_id: String,
    client: Box<dyn SiteClient>,
    queue: MemQueue<SubmissionId>,
    repo: Arc<dyn SubmissionRepository>,
    status_crawler: StatusCrawlerHandle,
    stop_flag: Arc<AtomicBool>,
    policy: PolicyConfig,
    login_retries: LoginRetryCounts,
}

impl Submitter {
    pub fn new(
        user_id: String,
        client: Box<dyn SiteClient>,
        queue: MemQueue<SubmissionId>,
        repo: Arc<dyn SubmissionRepository>,
        status_crawler: StatusCrawlerHandle,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            user_id,
            client,
            queue,
            repo,
            status_crawler,
            stop_flag: Arc::new(AtomicBool::new(false)),
            policy,
            login_retries: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    /// Signal this submitter to stop. The run loop drains outstanding
    /// in-flight work, then stops and joins the paired `StatusCrawler`
    /// (spec §4.1 "Stop").
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Shared stop flag, handed to `SubmitterHandler` so it can request a
    /// stop from outside the `run` loop it owns.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Main dispatch loop. Wakes every `submitter_dequeue_timeout_secs` to
    /// observe the stop flag (spec §4.1 "Blocking").
    pub async fn run(mut self) {
        let dequeue_timeout = Duration::from_secs(self.policy.submitter_dequeue_timeout_secs);

        while !self.stop_flag.load(Ordering::SeqCst) {
            match self.queue.pop(dequeue_timeout).await {
                Some(id) => self.process(id).await,
                None => continue,
            }
        }

        while let Some(id) = self.queue.try_pop().await {
            self.process(id).await;
        }

        self.status_crawler.stop();
        self.status_crawler.join().await;
    }

    /// Algorithm per dequeued id (spec §4.1 steps 1-4).
    async fn process(&mut self, id: SubmissionId) {
        let submission = match self.repo.find_by_id(id).await {
            Ok(Some(s)) => s,
            _ => return,
        };

        if submission.verdict == Verdict::BeingJudged {
            let _ = self.status_crawler.add_task(id).await;
            return;
        }
        if submission.verdict != Verdict::Queuing {
            return;
        }

        match self
            .client
            .submit_problem(&submission.problem_id, &submission.language, &submission.source_code)
            .await
        {
            Ok(run_id) => {
                let _ = self.repo.mark_being_judged(id, &run_id, &self.user_id).await;
                self.login_retries.lock().await.remove(&id);
                let _ = self.status_crawler.add_task(id).await;
            }
            Err(JudgeError::SubmitError(_)) | Err(JudgeError::ConnectionError(_)) => {
                self.fail_submit(id).await;
            }
            Err(JudgeError::LoginExpired) => {
                self.handle_login_expired(id).await;
            }
            Err(_) => {
                // LoginRequired / JudgeException during submit are not
                // recoverable here; fall back to the same terminal outcome
                // every other unrecoverable fault gets (spec §4.1 "Failure
                // semantics": a single submission never blocks another).
                self.fail_submit(id).await;
            }
        }
    }

    async fn handle_login_expired(&mut self, id: SubmissionId) {
        let mut retries = self.login_retries.lock().await;
        let count = retries.entry(id).or_insert(0);
        if *count >= self.policy.max_login_retries {
            drop(retries);
            self.fail_submit(id).await;
            return;
        }
        *count += 1;
        drop(retries);

        match self.client.update_cookies().await {
            Ok(()) => self.queue.push(id),
            Err(_) => self.fail_submit(id).await,
        }
    }

    async fn fail_submit(&self, id: SubmissionId) {
        let _ = self
            .repo
            .commit_terminal(id, Verdict::SubmitFailed, None, None)
            .await;
        self.login_retries.lock().await.remove(&id);
    }
}
