//! StatusCrawler (spec §4.2): one per (OJ, account), polling each
//! `Being Judged` submission until a terminal verdict or deadline.
//!
//! The crawler owns a dedicated OS thread running its own single-threaded
//! Tokio runtime (spec §4.2 "the tasks run on the crawler's own
//! single-threaded cooperative loop", §9 "a worker thread owns a task
//! scheduler"). `add_task` is a cheap, thread-safe channel send; the actual
//! poll tasks are scheduled onto that private runtime, so many in-flight
//! polls multiplex over one shared `SiteClient` session without needing a
//! thread per submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Notify};
use tokio::task::JoinSet;
use vjudge_common::{JudgeError, OjName, SiteClient, SubmissionId};

use crate::config::PolicyConfig;
use crate::db::SubmissionRepository;

enum Command {
    AddTask(SubmissionId, oneshot::Sender<Result<(), AddTaskError>>),
    Stop,
}

/// Failure returned by `add_task` (spec §4.2: "fails if not started or
/// already stopping").
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddTaskError {
    #[error("status crawler is not started")]
    NotStarted,
    #[error("status crawler is stopping")]
    Stopping,
}

/// Handle to a running `StatusCrawler`. Cloning shares the same underlying
/// worker thread; the thread itself is joined exactly once, by whichever
/// handle calls `stop` last through `Arc`-owned shutdown state.
#[derive(Clone)]
pub struct StatusCrawlerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    started: Arc<Notify>,
    is_started: Arc<AtomicBool>,
    is_stopping: Arc<AtomicBool>,
    stop_called: Arc<AtomicBool>,
    join: Arc<AsyncMutex<Option<std::thread::JoinHandle<()>>>>,
}

impl StatusCrawlerHandle {
    /// Boots the cooperative loop on its own thread (spec §4.2 `start`).
    pub fn start(
        oj_name: OjName,
        client: Box<dyn SiteClient>,
        repo: Arc<dyn SubmissionRepository>,
        policy: PolicyConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let started = Arc::new(Notify::new());
        let is_started = Arc::new(AtomicBool::new(false));
        let is_stopping = Arc::new(AtomicBool::new(false));

        let started_for_thread = started.clone();
        let is_started_for_thread = is_started.clone();
        let client = Arc::new(AsyncMutex::new(client));

        let join = std::thread::Builder::new()
            .name(format!("status-crawler-{}", oj_name.as_str()))
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build status crawler runtime");

                rt.block_on(run_loop(
                    cmd_rx,
                    client,
                    repo,
                    oj_name,
                    policy,
                    started_for_thread,
                    is_started_for_thread,
                ));
            })
            .expect("failed to spawn status crawler thread");

        Self {
            cmd_tx,
            started,
            is_started,
            is_stopping,
            stop_called: Arc::new(AtomicBool::new(false)),
            join: Arc::new(AsyncMutex::new(Some(join))),
        }
    }

    /// Blocks until `start` has initialized the loop (spec §4.2
    /// `wait_start`).
    pub async fn wait_start(&self) {
        if self.is_started.load(Ordering::SeqCst) {
            return;
        }
        self.started.notified().await;
    }

    /// Schedules one poll task (spec §4.2 `add_task`). Fails fast with
    /// `Stopping` once `stop` has been called, distinct from `NotStarted`
    /// (the loop never ran or has already exited).
    pub async fn add_task(&self, id: SubmissionId) -> Result<(), AddTaskError> {
        if self.is_stopping.load(Ordering::SeqCst) {
            return Err(AddTaskError::Stopping);
        }
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::AddTask(id, tx)).is_err() {
            return Err(AddTaskError::NotStarted);
        }
        rx.await.unwrap_or(Err(AddTaskError::NotStarted))
    }

    /// Idempotent-once stop (spec §4.2: "calling twice is a programming
    /// error").
    pub fn stop(&self) {
        let already = self.stop_called.swap(true, Ordering::SeqCst);
        assert!(!already, "StatusCrawler::stop called twice");
        self.is_stopping.store(true, Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::Stop);
    }

    /// Waits for the worker thread to exit after `stop`.
    pub async fn join(&self) {
        let handle = self.join.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    client: Arc<AsyncMutex<Box<dyn SiteClient>>>,
    repo: Arc<dyn SubmissionRepository>,
    oj_name: OjName,
    policy: PolicyConfig,
    started: Arc<Notify>,
    is_started: Arc<AtomicBool>,
) {
    is_started.store(true, Ordering::SeqCst);
    started.notify_waiters();

    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut stopping = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::AddTask(id, ack)) if !stopping => {
                        let client = client.clone();
                        let repo = repo.clone();
                        let oj_name = oj_name.clone();
                        let policy = policy.clone();
                        tasks.spawn(async move {
                            poll_submission(client, repo, oj_name, id, policy).await;
                        });
                        let _ = ack.send(Ok(()));
                    }
                    Some(Command::AddTask(_, ack)) => {
                        // Already stopping: ack the caller instead of letting
                        // the message sit unconsumed until the thread exits.
                        let _ = ack.send(Err(AddTaskError::Stopping));
                    }
                    Some(Command::Stop) => {
                        stopping = true;
                    }
                    None => {
                        stopping = true;
                    }
                }
            }
            joined = tasks.join_next(), if !tasks.is_empty() => {
                let _ = joined;
            }
            else => break,
        }

        if stopping && tasks.is_empty() {
            break;
        }
    }
}

/// Per-task algorithm (spec §4.2, steps 1-3). `LoginExpired` retries the
/// same attempt (does not count against the 120-attempt budget, spec §8
/// "boundary behaviors") but is itself bounded by `max_login_retries` so a
/// persistently-failing login cannot spin forever.
async fn poll_submission(
    client: Arc<AsyncMutex<Box<dyn SiteClient>>>,
    repo: Arc<dyn SubmissionRepository>,
    oj_name: OjName,
    id: SubmissionId,
    policy: PolicyConfig,
) {
    let submission = match repo.find_by_id(id).await {
        Ok(Some(s)) => s,
        _ => return,
    };

    let Some(run_id) = submission.run_id.clone() else {
        return;
    };
    if submission.oj_name != oj_name || submission.verdict != vjudge_common::Verdict::BeingJudged {
        return;
    }
    let Some(user_id) = submission.user_id.clone() else {
        return;
    };

    let mut attempt: u32 = 0;
    let mut login_retries: u32 = 0;

    loop {
        if attempt >= policy.max_poll_attempts {
            let _ = repo
                .commit_terminal(id, vjudge_common::Verdict::JudgeFailed, None, None)
                .await;
            return;
        }

        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;

        let result = client
            .lock()
            .await
            .get_submit_status(&run_id, &user_id, &submission.problem_id)
            .await;

        match result {
            Err(JudgeError::ConnectionError(_)) => {
                let _ = repo
                    .commit_terminal(id, vjudge_common::Verdict::JudgeFailed, None, None)
                    .await;
                return;
            }
            Err(JudgeError::LoginExpired) => {
                login_retries += 1;
                if login_retries > policy.max_login_retries {
                    let _ = repo
                        .commit_terminal(id, vjudge_common::Verdict::JudgeFailed, None, None)
                        .await;
                    return;
                }
                if client.lock().await.update_cookies().await.is_err() {
                    let _ = repo
                        .commit_terminal(id, vjudge_common::Verdict::JudgeFailed, None, None)
                        .await;
                    return;
                }
                continue;
            }
            Err(_) => {
                let _ = repo
                    .commit_terminal(id, vjudge_common::Verdict::JudgeFailed, None, None)
                    .await;
                return;
            }
            Ok(status) => {
                if status.verdict.is_transient_poll_status() {
                    attempt += 1;
                    continue;
                }
                let _ = repo
                    .commit_terminal(id, status.verdict, status.exe_time_ms, status.exe_mem_kb)
                    .await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::submission_repo::test_support::InMemorySubmissionRepository;
    use vjudge_common::{MockSiteClient, Submission, SubmitStatus, Verdict};

    fn submission(id: SubmissionId, verdict: Verdict) -> Submission {
        Submission {
            id,
            oj_name: OjName::from("hdu"),
            problem_id: "1000".into(),
            language: "G++".into(),
            source_code: "int main(){}".into(),
            user_id: Some("acct1".into()),
            run_id: Some("R42".into()),
            verdict,
            exe_time: None,
            exe_mem: None,
            time_stamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn happy_path_commits_terminal_verdict() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![submission(
            1,
            Verdict::BeingJudged,
        )]));

        let mut mock = MockSiteClient::new();
        let mut call = 0;
        mock.expect_get_submit_status().returning(move |_, _, _| {
            call += 1;
            if call < 3 {
                Ok(SubmitStatus {
                    verdict: Verdict::BeingJudged,
                    exe_time_ms: None,
                    exe_mem_kb: None,
                })
            } else {
                Ok(SubmitStatus {
                    verdict: Verdict::Accepted,
                    exe_time_ms: Some(12),
                    exe_mem_kb: Some(256),
                })
            }
        });

        poll_submission(
            Arc::new(AsyncMutex::new(Box::new(mock))),
            repo.clone(),
            OjName::from("hdu"),
            1,
            PolicyConfig::default(),
        )
        .await;

        let row = repo.get(1).await.unwrap();
        assert_eq!(row.verdict, Verdict::Accepted);
        assert_eq!(row.exe_time, Some(12));
        assert_eq!(row.exe_mem, Some(256));
    }

    #[tokio::test]
    async fn connection_error_commits_judge_failed() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![submission(
            2,
            Verdict::BeingJudged,
        )]));

        let mut mock = MockSiteClient::new();
        mock.expect_get_submit_status()
            .returning(|_, _, _| Err(JudgeError::ConnectionError("down".into())));

        poll_submission(
            Arc::new(AsyncMutex::new(Box::new(mock))),
            repo.clone(),
            OjName::from("hdu"),
            2,
            PolicyConfig::default(),
        )
        .await;

        assert_eq!(repo.get(2).await.unwrap().verdict, Verdict::JudgeFailed);
    }

    #[tokio::test]
    async fn exhausting_attempts_commits_judge_failed() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![submission(
            3,
            Verdict::BeingJudged,
        )]));

        let mut mock = MockSiteClient::new();
        mock.expect_get_submit_status().returning(|_, _, _| {
            Ok(SubmitStatus {
                verdict: Verdict::Running,
                exe_time_ms: None,
                exe_mem_kb: None,
            })
        });

        let mut policy = PolicyConfig::default();
        policy.max_poll_attempts = 2;

        poll_submission(
            Arc::new(AsyncMutex::new(Box::new(mock))),
            repo.clone(),
            OjName::from("hdu"),
            3,
            policy,
        )
        .await;

        assert_eq!(repo.get(3).await.unwrap().verdict, Verdict::JudgeFailed);
    }

    #[tokio::test]
    async fn login_expired_does_not_consume_attempt_budget() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![submission(
            4,
            Verdict::BeingJudged,
        )]));

        let mut mock = MockSiteClient::new();
        let mut call = 0;
        mock.expect_get_submit_status().returning(move |_, _, _| {
            call += 1;
            if call == 1 {
                Err(JudgeError::LoginExpired)
            } else {
                Ok(SubmitStatus {
                    verdict: Verdict::Accepted,
                    exe_time_ms: Some(1),
                    exe_mem_kb: Some(1),
                })
            }
        });
        mock.expect_update_cookies().returning(|| Ok(()));

        let mut policy = PolicyConfig::default();
        policy.max_poll_attempts = 1;

        poll_submission(
            Arc::new(AsyncMutex::new(Box::new(mock))),
            repo.clone(),
            OjName::from("hdu"),
            4,
            policy,
        )
        .await;

        assert_eq!(repo.get(4).await.unwrap().verdict, Verdict::Accepted);
    }

    #[tokio::test]
    async fn add_task_before_start_fails() {
        // A handle whose thread never ran `start`'s notify path still
        // accepts sends on the channel; exercise the "not started" path by
        // dropping the receiver instead (simulates a torn-down loop).
        let (tx, rx) = mpsc::unbounded_channel::<Command>();
        drop(rx);
        let handle = StatusCrawlerHandle {
            cmd_tx: tx,
            started: Arc::new(Notify::new()),
            is_started: Arc::new(AtomicBool::new(false)),
            is_stopping: Arc::new(AtomicBool::new(false)),
            stop_called: Arc::new(AtomicBool::new(false)),
            join: Arc::new(AsyncMutex::new(None)),
        };
        assert_eq!(handle.add_task(1).await, Err(AddTaskError::NotStarted));
    }

    #[tokio::test]
    async fn add_task_after_stop_fails_fast_with_stopping() {
        let repo = Arc::new(InMemorySubmissionRepository::new(vec![]));
        let handle = StatusCrawlerHandle::start(
            OjName::from("hdu"),
            Box::new(MockSiteClient::new()),
            repo,
            PolicyConfig::default(),
        );
        handle.wait_start().await;
        handle.stop();
        assert_eq!(handle.add_task(1).await, Err(AddTaskError::Stopping));
        handle.join().await;
    }
}
