pub mod event;
pub mod session;

pub use event::{Event, EventKind, Point, Sample, WindowInfo, WindowRect, SCREENSHOT_DESCRIPTION};
pub use session::{
    created_marker, duration_secs, session_id, Analysis, RecordingMeta, Session, SessionKind,
    SessionRecord, SessionStatus,
};
