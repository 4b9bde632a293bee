pub mod classifier;
pub mod config;
pub mod controller;
pub mod detector;
pub mod event_log;
pub mod loop_worker;

pub use config::SamplingConfig;
pub use controller::SensingController;
pub use event_log::EventLog;
