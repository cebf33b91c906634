//! Shared data model (spec §3): submissions, problems, accounts, verdicts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submission id, assigned by the database on insert.
pub type SubmissionId = i64;

/// Verdict of a submission, covering both non-terminal (in-flight) and
/// terminal states (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Pre-submit, or reported by the OJ mid-poll.
    Queuing,
    /// Submitted, awaiting or undergoing judgement.
    BeingJudged,
    Compiling,
    Running,

    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompileError,
    PresentationError,
    SubmitFailed,
    JudgeFailed,
    JudgeTimeout,
}

impl Verdict {
    /// Non-terminal verdicts are the only ones that may re-enter a queue.
    pub const REQUEUEABLE: [Verdict; 2] = [Verdict::Queuing, Verdict::BeingJudged];

    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Verdict::Queuing | Verdict::BeingJudged | Verdict::Compiling | Verdict::Running
        )
    }

    /// Transient statuses reported by `get_submit_status` that mean "keep polling".
    pub fn is_transient_poll_status(self) -> bool {
        matches!(
            self,
            Verdict::BeingJudged | Verdict::Queuing | Verdict::Compiling | Verdict::Running
        )
    }

    /// Stable string used to persist the verdict (matches the literal names
    /// spec §8's scenarios assert on, e.g. `"Accepted"`, `"Submit Failed"`).
    pub fn to_db_str(self) -> &'static str {
        match self {
            Verdict::Queuing => "Queuing",
            Verdict::BeingJudged => "Being Judged",
            Verdict::Compiling => "Compiling",
            Verdict::Running => "Running",
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompileError => "Compile Error",
            Verdict::PresentationError => "Presentation Error",
            Verdict::SubmitFailed => "Submit Failed",
            Verdict::JudgeFailed => "Judge Failed",
            Verdict::JudgeTimeout => "Judge Timeout",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Verdict> {
        Some(match s {
            "Queuing" => Verdict::Queuing,
            "Being Judged" => Verdict::BeingJudged,
            "Compiling" => Verdict::Compiling,
            "Running" => Verdict::Running,
            "Accepted" => Verdict::Accepted,
            "Wrong Answer" => Verdict::WrongAnswer,
            "Time Limit Exceeded" => Verdict::TimeLimitExceeded,
            "Memory Limit Exceeded" => Verdict::MemoryLimitExceeded,
            "Runtime Error" => Verdict::RuntimeError,
            "Compile Error" => Verdict::CompileError,
            "Presentation Error" => Verdict::PresentationError,
            "Submit Failed" => Verdict::SubmitFailed,
            "Judge Failed" => Verdict::JudgeFailed,
            "Judge Timeout" => Verdict::JudgeTimeout,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Queuing => "Queuing",
            Verdict::BeingJudged => "Being Judged",
            Verdict::Compiling => "Compiling",
            Verdict::Running => "Running",
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompileError => "Compile Error",
            Verdict::PresentationError => "Presentation Error",
            Verdict::SubmitFailed => "Submit Failed",
            Verdict::JudgeFailed => "Judge Failed",
            Verdict::JudgeTimeout => "Judge Timeout",
        };
        write!(f, "{s}")
    }
}

/// An online-judge name, possibly contest-qualified (`hdu_ct_42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OjName(pub String);

impl OjName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OjName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OjName {
    fn from(s: &str) -> Self {
        OjName(s.to_string())
    }
}

impl From<String> for OjName {
    fn from(s: String) -> Self {
        OjName(s)
    }
}

/// Persistent submission row (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub oj_name: OjName,
    pub problem_id: String,
    pub language: String,
    pub source_code: String,
    pub user_id: Option<String>,
    pub run_id: Option<String>,
    pub verdict: Verdict,
    pub exe_time: Option<i64>,
    pub exe_mem: Option<i64>,
    pub time_stamp: DateTime<Utc>,
}

impl Submission {
    /// A submission may enter an in-memory queue only from these states
    /// (spec §3 invariant).
    pub fn is_queueable(&self) -> bool {
        matches!(self.verdict, Verdict::Queuing | Verdict::BeingJudged)
    }
}

/// Persistent problem row, keyed by `(oj_name, problem_id)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub oj_name: OjName,
    pub problem_id: String,
    pub title: String,
    pub description: String,
    pub input: String,
    pub output: String,
    pub sample_input: String,
    pub sample_output: String,
    pub time_limit: i64,
    pub mem_limit: i64,
    pub last_update: DateTime<Utc>,
}

/// Staleness window for problem refresh (spec §3, §4.5).
pub const PROBLEM_STALE_AFTER: chrono::Duration = chrono::Duration::hours(24);

impl Problem {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_update > PROBLEM_STALE_AFTER
    }
}

/// Attributes returned by `SiteClient::get_problem`, copied onto a `Problem`
/// row by field name (spec §4.3: "copy recognized attributes").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemAttributes {
    pub title: Option<String>,
    pub description: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub sample_input: Option<String>,
    pub sample_output: Option<String>,
    pub time_limit: Option<i64>,
    pub mem_limit: Option<i64>,
}

impl ProblemAttributes {
    pub fn apply_to(&self, problem: &mut Problem) {
        if let Some(v) = &self.title {
            problem.title = v.clone();
        }
        if let Some(v) = &self.description {
            problem.description = v.clone();
        }
        if let Some(v) = &self.input {
            problem.input = v.clone();
        }
        if let Some(v) = &self.output {
            problem.output = v.clone();
        }
        if let Some(v) = &self.sample_input {
            problem.sample_input = v.clone();
        }
        if let Some(v) = &self.sample_output {
            problem.sample_output = v.clone();
        }
        if let Some(v) = self.time_limit {
            problem.time_limit = v;
        }
        if let Some(v) = self.mem_limit {
            problem.mem_limit = v;
        }
    }
}

/// Result of a status poll (spec §6.2 `get_submit_status`).
#[derive(Debug, Clone)]
pub struct SubmitStatus {
    pub verdict: Verdict,
    pub exe_time_ms: Option<i64>,
    pub exe_mem_kb: Option<i64>,
}

/// A borrowed (username, password) credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// Process-lifetime accounts table, loaded once from `OJ_CONFIG` (spec §3,
/// §6.4). Read-only after startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountTable {
    #[serde(default)]
    pub normal_accounts: HashMap<String, Vec<Account>>,
    #[serde(default)]
    pub contest_accounts: HashMap<String, Vec<Account>>,
}

impl AccountTable {
    /// Resolve accounts for an OJ name, preferring `normal_accounts` and
    /// falling back to `contest_accounts` (spec §4.4: "Resolve accounts for
    /// `O` from `normal_accounts` if present, else from `contest_accounts`").
    pub fn accounts_for(&self, oj_name: &OjName) -> Option<&[Account]> {
        self.normal_accounts
            .get(oj_name.as_str())
            .or_else(|| self.contest_accounts.get(oj_name.as_str()))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.normal_accounts.is_empty() && self.contest_accounts.is_empty()
    }
}

/// Contest client status (spec §6.2): contest clients must refuse
/// `submit_problem` unless `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Pending,
    Running,
    Ended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_db_str_round_trips() {
        for v in [
            Verdict::Queuing,
            Verdict::BeingJudged,
            Verdict::Accepted,
            Verdict::SubmitFailed,
            Verdict::JudgeFailed,
            Verdict::JudgeTimeout,
        ] {
            assert_eq!(Verdict::from_db_str(v.to_db_str()), Some(v));
        }
        assert_eq!(Verdict::from_db_str("nonsense"), None);
    }

    #[test]
    fn verdict_terminality() {
        assert!(!Verdict::Queuing.is_terminal());
        assert!(!Verdict::BeingJudged.is_terminal());
        assert!(Verdict::Accepted.is_terminal());
        assert!(Verdict::SubmitFailed.is_terminal());
    }

    #[test]
    fn accounts_fall_back_to_contest_table() {
        let mut table = AccountTable::default();
        table.contest_accounts.insert(
            "hdu_ct_42".to_string(),
            vec![Account {
                username: "u".into(),
                password: "p".into(),
            }],
        );
        let oj = OjName::from("hdu_ct_42");
        assert!(table.accounts_for(&oj).is_some());
        assert!(table.accounts_for(&OjName::from("unknown")).is_none());
    }

    #[test]
    fn problem_staleness() {
        let now = Utc::now();
        let problem = Problem {
            oj_name: OjName::from("hdu"),
            problem_id: "1000".into(),
            title: String::new(),
            description: String::new(),
            input: String::new(),
            output: String::new(),
            sample_input: String::new(),
            sample_output: String::new(),
            time_limit: 1000,
            mem_limit: 65536,
            last_update: now - chrono::Duration::hours(26),
        };
        assert!(problem.is_stale(now));
        let fresh = Problem {
            last_update: now - chrono::Duration::hours(1),
            ..problem
        };
        assert!(!fresh.is_stale(now));
    }
}
