use std::collections::HashSet;

use anyhow::{bail, Result};
use log::{debug, error};

use crate::models::{Analysis, Event, EventKind, SessionKind};

/// Summary line reported when the pass could not complete.
pub const ANALYSIS_FAILED: &str = "analysis failed";

/// Screenshots are kept only within this many positions of a click or window change.
const KEY_MOMENT_RADIUS: usize = 2;

/// Reduces a finished session's raw events to the relevant, deduplicated actions.
///
/// Never fails: a broken input yields a degraded analysis that still reports the true
/// number of observed events.
pub fn analyze(raw_events: &[Event]) -> Analysis {
    analyze_with(raw_events, filter_relevant)
}

/// Manual steps are all kept, repeats included. Sampled sessions go through the filter.
pub fn analyze_session(kind: SessionKind, raw_events: &[Event]) -> Analysis {
    match kind {
        SessionKind::Manual => analyze_with(raw_events, <[Event]>::to_vec),
        SessionKind::Intelligent => analyze(raw_events),
    }
}

fn analyze_with(raw_events: &[Event], select: fn(&[Event]) -> Vec<Event>) -> Analysis {
    match try_analyze(raw_events, select) {
        Ok(analysis) => analysis,
        Err(err) => {
            error!("Failed to analyze recorded events: {err:#}");
            Analysis {
                total_events: raw_events.len(),
                relevant_actions: 0,
                summary_lines: vec![ANALYSIS_FAILED.to_string()],
                filtered_events: Vec::new(),
            }
        }
    }
}

fn try_analyze(raw_events: &[Event], select: fn(&[Event]) -> Vec<Event>) -> Result<Analysis> {
    if let Some((index, _)) = raw_events
        .iter()
        .enumerate()
        .find(|(_, event)| event.description().trim().is_empty())
    {
        bail!("event {} has an empty description", index + 1);
    }

    let filtered_events = select(raw_events);
    let summary_lines = summarize(&filtered_events);
    debug!(
        "Kept {} of {} recorded events",
        filtered_events.len(),
        raw_events.len()
    );

    Ok(Analysis {
        total_events: raw_events.len(),
        relevant_actions: filtered_events.len(),
        summary_lines,
        filtered_events,
    })
}

/// First occurrence of each description wins; screenshots also need a nearby key moment.
pub fn filter_relevant(raw_events: &[Event]) -> Vec<Event> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut kept = Vec::new();

    for (index, event) in raw_events.iter().enumerate() {
        if seen.contains(event.description()) {
            continue;
        }
        if event.kind() == EventKind::Screenshot && !is_key_moment(raw_events, index) {
            continue;
        }
        seen.insert(event.description());
        kept.push(event.clone());
    }

    kept
}

/// True when a click or window change sits within [index - 2, index + 2].
pub fn is_key_moment(raw_events: &[Event], index: usize) -> bool {
    let start = index.saturating_sub(KEY_MOMENT_RADIUS);
    let end = (index + KEY_MOMENT_RADIUS + 1).min(raw_events.len());
    raw_events[start..end]
        .iter()
        .enumerate()
        .any(|(offset, event)| start + offset != index && event.is_navigation())
}

pub fn summarize(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .enumerate()
        .map(|(i, event)| format!("{}. {}", i + 1, event.description()))
        .collect()
}
