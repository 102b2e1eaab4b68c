use bewertung_core::consensus::{
    append_event, count_by_rating, display_state, most_frequent_rating, remove_event,
};
use bewertung_core::model::{
    Rating, RatingEvent, Thickness, MAX_TIMESTAMP_MS, MIN_TIMESTAMP_MS,
};
use bewertung_core::sanitize::sanitize_rating_event;
use proptest::prelude::*;

fn rating_strategy() -> impl Strategy<Value = Rating> {
    (0i64..=4).prop_map(|v| Rating::from_i64(v).unwrap())
}

fn event_strategy() -> impl Strategy<Value = RatingEvent> {
    (rating_strategy(), MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS)
        .prop_map(|(rating, timestamp)| RatingEvent { rating, timestamp })
}

fn history_strategy() -> impl Strategy<Value = Vec<RatingEvent>> {
    prop::collection::vec(event_strategy(), 0..40)
}

proptest! {
    // The winner always holds a maximal count among valid events.
    #[test]
    fn winner_has_maximal_count(events in history_strategy()) {
        if let Some(winner) = most_frequent_rating(&events) {
            let winner_count = count_by_rating(&events, winner);
            for rating in Rating::ALL {
                prop_assert!(count_by_rating(&events, rating) <= winner_count);
            }
            prop_assert!(winner_count > 0);
        } else {
            prop_assert!(events.is_empty());
        }
    }

    // Among ratings tied at the maximal count, no loser has a strictly
    // newer latest event than the winner.
    #[test]
    fn tie_break_prefers_latest(events in history_strategy()) {
        let Some(winner) = most_frequent_rating(&events) else { return Ok(()); };
        let winner_count = count_by_rating(&events, winner);
        let latest_of = |target: Rating| {
            events
                .iter()
                .filter(|e| e.rating == target && e.has_plausible_timestamp())
                .map(|e| e.timestamp)
                .max()
        };
        let winner_latest = latest_of(winner).expect("winner has events");
        for rating in Rating::ALL {
            if rating != winner && count_by_rating(&events, rating) == winner_count {
                prop_assert!(latest_of(rating).expect("tied rating has events") <= winner_latest);
            }
        }
    }

    // Counts partition the valid events.
    #[test]
    fn counts_sum_to_valid_events(events in history_strategy()) {
        let total: usize = Rating::ALL
            .iter()
            .map(|r| count_by_rating(&events, *r))
            .sum();
        prop_assert_eq!(total, events.len());
    }

    #[test]
    fn thickness_follows_count(events in history_strategy(), target in rating_strategy()) {
        let state = display_state(&events, target);
        let expected = match state.count {
            0 | 1 => Thickness::Thin,
            2 => Thickness::Medium,
            _ => Thickness::Thick,
        };
        prop_assert_eq!(state.thickness, expected);
        prop_assert_eq!(state.show_badge, state.count > 0);
    }

    // Sanitizing an already-valid event is the identity.
    #[test]
    fn sanitize_is_idempotent(event in event_strategy()) {
        let raw = serde_json::to_value(event).unwrap();
        let once = sanitize_rating_event(&raw).expect("valid event survives");
        prop_assert_eq!(once, event);
        let again = sanitize_rating_event(&serde_json::to_value(once).unwrap()).expect("still valid");
        prop_assert_eq!(again, once);
    }

    // Append then exact-match remove restores the original history.
    #[test]
    fn append_then_remove_round_trips(events in history_strategy(), event in event_strategy()) {
        // Removal is exact-match on (rating, timestamp); duplicates would
        // also be removed, so only check when the pair is fresh.
        prop_assume!(!events
            .iter()
            .any(|e| e.rating == event.rating && e.timestamp == event.timestamp));
        let appended = append_event(&events, event);
        let removed = remove_event(&appended, event.rating, event.timestamp);
        prop_assert_eq!(removed, events);
    }

    // Removal never touches events for other (rating, timestamp) pairs.
    #[test]
    fn remove_is_selective(events in history_strategy(), target in event_strategy()) {
        let after = remove_event(&events, target.rating, target.timestamp);
        for e in &events {
            let is_target = e.rating == target.rating && e.timestamp == target.timestamp;
            prop_assert_eq!(after.contains(e), !is_target);
        }
        prop_assert!(after.iter().all(|e| events.contains(e)));
    }
}
