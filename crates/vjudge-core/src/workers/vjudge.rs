//! VJudge root (spec §4.6): owns both handlers and the account tables.

use std::sync::Arc;
use std::time::Duration;

use vjudge_common::AccountTable;

use crate::workers::crawler_handler::CrawlerHandler;
use crate::workers::submitter_handler::SubmitterHandler;

/// Interval between retries of OJs whose submitter group failed to start
/// at boot (e.g. bad credentials at startup) — without this, such an OJ
/// would stay dead for the lifetime of the process.
const RETRY_UNAVAILABLE_OJS_INTERVAL: Duration = Duration::from_secs(3600);

pub struct VJudge {
    submitter_handler: Arc<SubmitterHandler>,
    crawler_handler: Arc<CrawlerHandler>,
    accounts: AccountTable,
}

impl VJudge {
    pub fn new(
        submitter_handler: SubmitterHandler,
        crawler_handler: CrawlerHandler,
        accounts: AccountTable,
    ) -> Self {
        if accounts.is_empty() {
            tracing::warn!("VJudge starting with no configured accounts; it will accept no OJ traffic");
        }

        Self {
            submitter_handler: Arc::new(submitter_handler),
            crawler_handler: Arc::new(crawler_handler),
            accounts,
        }
    }

    pub fn accounts(&self) -> &AccountTable {
        &self.accounts
    }

    /// Spawns each handler as a background worker and awaits them; they
    /// run forever (spec §4.6 `start`).
    pub async fn start(self) {
        let submitter_handler = self.submitter_handler.clone();
        let submit_task = tokio::spawn(async move { submitter_handler.run().await });

        let crawler_handler = self.crawler_handler.clone();
        let crawl_task = tokio::spawn(async move { crawler_handler.run().await });

        let retry_handler = self.submitter_handler.clone();
        let retry_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(RETRY_UNAVAILABLE_OJS_INTERVAL).await;
                retry_handler.retry_unavailable_ojs().await;
            }
        });

        let _ = tokio::join!(submit_task, crawl_task, retry_task);
    }
}
