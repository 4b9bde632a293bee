pub mod filter;

pub use filter::{analyze, analyze_session, filter_relevant, summarize, ANALYSIS_FAILED};
