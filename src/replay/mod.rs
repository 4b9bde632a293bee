pub mod player;

pub use player::{step_delay, type_lines, ReplayReport, Replayer, StepFailure};
