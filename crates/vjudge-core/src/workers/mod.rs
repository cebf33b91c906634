//! Dispatch and judging engine workers (spec §4).

pub mod crawler_handler;
pub mod problem_crawler;
pub mod status_crawler;
pub mod submitter;
pub mod submitter_handler;
pub mod vjudge;

pub use crawler_handler::CrawlerHandler;
pub use problem_crawler::ProblemCrawler;
pub use status_crawler::{AddTaskError, StatusCrawlerHandle};
pub use submitter::Submitter;
pub use submitter_handler::SubmitterHandler;
pub use vjudge::VJudge;
