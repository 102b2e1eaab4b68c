//! Reduces a competency's rating history to a single representative value.
//!
//! All functions are pure and tolerate implausible timestamps by skipping
//! the affected event rather than failing.

use crate::model::{Rating, RatingDisplayState, RatingEvent, Thickness};

fn valid_events(events: &[RatingEvent]) -> impl Iterator<Item = &RatingEvent> {
    events.iter().filter(|e| e.has_plausible_timestamp())
}

/// Count of valid events equal to `target`.
pub fn count_by_rating(events: &[RatingEvent], target: Rating) -> usize {
    valid_events(events).filter(|e| e.rating == target).count()
}

/// The rating with the highest count among valid events, or `None` if the
/// history holds no valid event.
///
/// Tie-break: among ratings sharing the maximum count, the one whose most
/// recent event has the larger timestamp wins. PDF export depends on this
/// exact rule.
pub fn most_frequent_rating(events: &[RatingEvent]) -> Option<Rating> {
    let mut counts = [0usize; Rating::ALL.len()];
    let mut latest = [i64::MIN; Rating::ALL.len()];

    let mut any = false;
    for e in valid_events(events) {
        let idx = e.rating as usize;
        counts[idx] += 1;
        latest[idx] = latest[idx].max(e.timestamp);
        any = true;
    }
    if !any {
        return None;
    }

    let mut best: Option<Rating> = None;
    let mut best_count = 0usize;
    let mut best_latest = i64::MIN;
    for rating in Rating::ALL {
        let idx = rating as usize;
        if counts[idx] == 0 {
            continue;
        }
        let wins = counts[idx] > best_count
            || (counts[idx] == best_count && latest[idx] > best_latest);
        if wins {
            best = Some(rating);
            best_count = counts[idx];
            best_latest = latest[idx];
        }
    }
    best
}

/// Derives the visual state for one rating option:
/// count 0/1 -> thin, 2 -> medium, 3+ -> thick; badge iff count > 0.
pub fn display_state(events: &[RatingEvent], target: Rating) -> RatingDisplayState {
    let count = count_by_rating(events, target);
    let thickness = match count {
        0 | 1 => Thickness::Thin,
        2 => Thickness::Medium,
        _ => Thickness::Thick,
    };
    RatingDisplayState {
        count,
        thickness,
        show_badge: count > 0,
    }
}

/// Valid events equal to `target`, in input order. Backs the history view.
pub fn events_for_rating(events: &[RatingEvent], target: Rating) -> Vec<RatingEvent> {
    valid_events(events)
        .filter(|e| e.rating == target)
        .copied()
        .collect()
}

/// Appends one event. Prior events are never mutated or removed.
pub fn append_event(events: &[RatingEvent], event: RatingEvent) -> Vec<RatingEvent> {
    let mut out = events.to_vec();
    out.push(event);
    out
}

/// Removes events matching exactly `(rating, timestamp)`. Other events for
/// the same competency are untouched.
pub fn remove_event(events: &[RatingEvent], rating: Rating, timestamp: i64) -> Vec<RatingEvent> {
    events
        .iter()
        .filter(|e| !(e.rating == rating && e.timestamp == timestamp))
        .copied()
        .collect()
}
