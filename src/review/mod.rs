mod budget;
mod context;
mod diff;
mod engine;
mod exclusions;
mod ground_truths;
mod linked_issues;
mod prompt;
mod verdict;

pub use engine::{PullReviewer, ReviewTrigger};
