use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Build a span from untrusted bounds, enforcing `start < end` and the global limits.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let span = Span::try_new(start, end).ok_or(EngineError::InvalidSpan { start, end })?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

/// First confirmed reservation of `hall` overlapping `span`, ignoring `exclude`.
pub fn find_conflict<'a>(
    hall: &'a HallState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    hall.overlapping(span)
        .find(|r| Some(r.id) != exclude && r.span.overlaps(span))
}

/// `true` when `span` collides with a confirmed reservation other than `exclude`.
pub fn has_conflict(hall: &HallState, span: &Span, exclude: Option<Ulid>) -> bool {
    find_conflict(hall, span, exclude).is_some()
}

/// Mutation-path form of [`find_conflict`]. Suggestions are filled in by the caller.
pub(crate) fn check_no_conflict(
    hall: &HallState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(hall, span, exclude) {
        Some(existing) => Err(EngineError::Conflict {
            with: existing.id,
            suggestions: Vec::new(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hall_with(spans: &[(Ms, Ms)]) -> (HallState, Vec<Ulid>) {
        let mut hs = HallState::new(HallSettings {
            id: Ulid::new(),
            name: None,
            capacity: 1,
            rate_per_day: 10.0,
            available_from: None,
            available_to: None,
        });
        let mut ids = Vec::new();
        for &(start, end) in spans {
            let id = Ulid::new();
            ids.push(id);
            hs.insert_reservation(Reservation {
                id,
                hall_id: hs.id,
                span: Span::new(start, end),
                total_cost: 0.0,
                requester: Requester::default(),
            });
        }
        (hs, ids)
    }

    #[test]
    fn empty_hall_never_conflicts() {
        let (hs, _) = hall_with(&[]);
        assert!(!has_conflict(&hs, &Span::new(0, 1000), None));
    }

    #[test]
    fn overlap_conflicts() {
        let (hs, ids) = hall_with(&[(100, 200)]);
        assert_eq!(find_conflict(&hs, &Span::new(150, 250), None).map(|r| r.id), Some(ids[0]));
        assert!(has_conflict(&hs, &Span::new(50, 101), None));
        assert!(has_conflict(&hs, &Span::new(120, 130), None));
        assert!(has_conflict(&hs, &Span::new(0, 1000), None));
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let (hs, _) = hall_with(&[(100, 200)]);
        assert!(!has_conflict(&hs, &Span::new(200, 300), None));
        assert!(!has_conflict(&hs, &Span::new(0, 100), None));
    }

    #[test]
    fn excluded_reservation_is_ignored() {
        let (hs, ids) = hall_with(&[(100, 200), (300, 400)]);
        assert!(!has_conflict(&hs, &Span::new(100, 250), Some(ids[0])));
        assert!(has_conflict(&hs, &Span::new(100, 350), Some(ids[0])));
    }

    #[test]
    fn check_no_conflict_reports_the_colliding_id() {
        let (hs, ids) = hall_with(&[(100, 200), (300, 400)]);
        match check_no_conflict(&hs, &Span::new(350, 500), None) {
            Err(EngineError::Conflict { with, suggestions }) => {
                assert_eq!(with, ids[1]);
                assert!(suggestions.is_empty());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(check_no_conflict(&hs, &Span::new(200, 300), None).is_ok());
    }

    #[test]
    fn validate_span_rejects_bad_input() {
        assert!(matches!(validate_span(10, 10), Err(EngineError::InvalidSpan { .. })));
        assert!(matches!(validate_span(10, 5), Err(EngineError::InvalidSpan { .. })));
        assert!(matches!(validate_span(-10, 5), Err(EngineError::LimitExceeded(_))));
        assert!(matches!(
            validate_span(0, MAX_SPAN_DURATION_MS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
        assert_eq!(validate_span(0, DAY_MS).unwrap(), Span::new(0, DAY_MS));
    }
}
