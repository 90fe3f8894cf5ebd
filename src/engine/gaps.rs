use std::iter::FusedIterator;

use crate::model::*;

/// Default look-around on each side of a requested span.
pub const DEFAULT_SEARCH_DAYS: i64 = 30;

/// Where to look for alternatives to a requested span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapQuery {
    pub requested: Span,
    pub search_before: Ms,
    pub search_after: Ms,
    /// Suggestions never start before this instant (usually "now").
    pub not_before: Ms,
    /// Bookable bounds of the hall.
    pub bounds: Span,
}

impl GapQuery {
    pub fn new(requested: Span) -> Self {
        Self {
            requested,
            search_before: DEFAULT_SEARCH_DAYS * DAY_MS,
            search_after: DEFAULT_SEARCH_DAYS * DAY_MS,
            not_before: Ms::MIN,
            bounds: Span { start: Ms::MIN, end: Ms::MAX },
        }
    }

    pub fn search_days(mut self, before: i64, after: i64) -> Self {
        self.search_before = before.saturating_mul(DAY_MS);
        self.search_after = after.saturating_mul(DAY_MS);
        self
    }

    pub fn not_before(mut self, t: Ms) -> Self {
        self.not_before = t;
        self
    }

    pub fn within(mut self, bounds: Span) -> Self {
        self.bounds = bounds;
        self
    }

    /// The search window `[start - before, end + after]` clamped to
    /// `not_before` and the hall bounds. `start >= end` means nothing fits.
    pub fn window(&self) -> (Ms, Ms) {
        let start = self
            .requested
            .start
            .saturating_sub(self.search_before)
            .max(self.not_before)
            .max(self.bounds.start);
        let end = self
            .requested
            .end
            .saturating_add(self.search_after)
            .min(self.bounds.end);
        (start, end)
    }
}

/// Lazy walk over the free gaps between busy spans inside a window.
///
/// Yields one [`DateRange`] of exactly the requested length at the start of
/// every gap that can hold it, in start order. With `N` busy spans there are
/// at most `N + 1` candidates. Busy spans must be sorted by start and
/// pairwise disjoint.
pub struct Gaps<I> {
    busy: I,
    cursor: Ms,
    window_start: Ms,
    window_end: Ms,
    duration: Ms,
    /// Emitted instead of the walk when the window holds no busy span.
    fallback: Option<DateRange>,
    seen_busy: bool,
    done: bool,
}

impl<I> Gaps<I>
where
    I: Iterator<Item = Span>,
{
    pub fn new(busy: I, query: &GapQuery) -> Self {
        let (window_start, window_end) = query.window();
        let duration = query.requested.duration_ms();
        let requested = DateRange {
            start: query.requested.start,
            end: query.requested.start.saturating_add(duration),
        };
        let fallback = if requested.start >= window_start && requested.end <= window_end {
            Some(requested)
        } else {
            fit(window_start, window_end, duration)
        };
        Self {
            busy,
            cursor: window_start,
            window_start,
            window_end,
            duration,
            fallback,
            seen_busy: false,
            done: window_start >= window_end,
        }
    }
}

fn fit(gap_start: Ms, gap_end: Ms, duration: Ms) -> Option<DateRange> {
    let end = gap_start.checked_add(duration)?;
    (end <= gap_end).then_some(DateRange { start: gap_start, end })
}

impl<I> Iterator for Gaps<I>
where
    I: Iterator<Item = Span>,
{
    type Item = DateRange;

    fn next(&mut self) -> Option<DateRange> {
        while !self.done {
            match self.busy.next() {
                Some(busy) => {
                    if busy.end <= self.window_start || busy.start >= self.window_end {
                        continue;
                    }
                    self.seen_busy = true;
                    let candidate = fit(self.cursor, busy.start, self.duration);
                    self.cursor = self.cursor.max(busy.end);
                    if candidate.is_some() {
                        return candidate;
                    }
                }
                None => {
                    self.done = true;
                    if !self.seen_busy {
                        return self.fallback.take();
                    }
                    return fit(self.cursor, self.window_end, self.duration);
                }
            }
        }
        None
    }
}

impl<I> FusedIterator for Gaps<I> where I: Iterator<Item = Span> {}

/// Gap walk over the confirmed reservations of `hall`.
pub fn gaps_in<'a>(hall: &'a HallState, query: &GapQuery) -> Gaps<impl Iterator<Item = Span> + use<'a>> {
    let (window_start, window_end) = query.window();
    // Reservations are disjoint, so ends are sorted as well as starts.
    let lo = hall
        .reservations
        .partition_point(|r| r.span.end <= window_start);
    let hi = hall
        .reservations
        .partition_point(|r| r.span.start < window_end)
        .max(lo);
    let busy = hall.reservations[lo..hi].iter().map(|r| r.span);
    Gaps::new(busy, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::ymd;
    use crate::engine::conflict::has_conflict;
    use ulid::Ulid;

    const D: Ms = DAY_MS;

    fn day(d: u32) -> Ms {
        ymd(2025, 6, d).unwrap()
    }

    fn hall_with(spans: &[(Ms, Ms)]) -> HallState {
        let mut hs = HallState::new(HallSettings {
            id: Ulid::new(),
            name: None,
            capacity: 1,
            rate_per_day: 50.0,
            available_from: None,
            available_to: None,
        });
        for &(start, end) in spans {
            hs.insert_reservation(Reservation {
                id: Ulid::new(),
                hall_id: hs.id,
                span: Span::new(start, end),
                total_cost: 0.0,
                requester: Requester::default(),
            });
        }
        hs
    }

    #[test]
    fn empty_window_suggests_the_request_itself() {
        let hs = hall_with(&[]);
        let q = GapQuery::new(Span::new(10 * D, 12 * D));
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(got, vec![DateRange { start: 10 * D, end: 12 * D }]);
    }

    #[test]
    fn gaps_before_between_and_after() {
        // Window is [100D - 30D, 102D + 30D] = [70D, 132D].
        let hs = hall_with(&[(80 * D, 90 * D), (95 * D, 110 * D), (111 * D, 125 * D)]);
        let q = GapQuery::new(Span::new(100 * D, 102 * D));
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(
            got,
            vec![
                DateRange { start: 70 * D, end: 72 * D },
                DateRange { start: 90 * D, end: 92 * D },
                DateRange { start: 125 * D, end: 127 * D },
            ]
        );
    }

    #[test]
    fn gap_exactly_the_requested_length_is_used() {
        let hs = hall_with(&[(0, 10 * D), (12 * D, 100 * D)]);
        let q = GapQuery::new(Span::new(5 * D, 7 * D)).within(Span::new(0, 100 * D));
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(got, vec![DateRange { start: 10 * D, end: 12 * D }]);
    }

    #[test]
    fn short_gaps_are_skipped() {
        let hs = hall_with(&[(0, 10 * D), (11 * D, 100 * D)]);
        let q = GapQuery::new(Span::new(5 * D, 7 * D)).within(Span::new(0, 100 * D));
        assert_eq!(gaps_in(&hs, &q).count(), 0);
    }

    #[test]
    fn duration_is_preserved_exactly() {
        let hs = hall_with(&[(50 * D, 60 * D)]);
        let requested = Span::new(55 * D, 55 * D + 90 * 60_000);
        let got: Vec<_> = gaps_in(&hs, &GapQuery::new(requested)).collect();
        assert!(!got.is_empty());
        for s in &got {
            assert_eq!(s.end - s.start, requested.duration_ms());
        }
    }

    #[test]
    fn reservation_straddling_window_start_pushes_cursor() {
        // Window starts at 70D, reservation covers [60D, 75D).
        let hs = hall_with(&[(60 * D, 75 * D)]);
        let q = GapQuery::new(Span::new(100 * D, 102 * D));
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(got, vec![DateRange { start: 75 * D, end: 77 * D }]);
    }

    #[test]
    fn touching_reservations_leave_no_gap() {
        let hs = hall_with(&[(70 * D, 100 * D), (100 * D, 132 * D)]);
        let q = GapQuery::new(Span::new(100 * D, 102 * D));
        assert_eq!(gaps_in(&hs, &q).count(), 0);
    }

    #[test]
    fn not_before_clamps_the_window() {
        // Scenario: booked [06-01, 06-10), request [06-03, 06-05) made on 06-03.
        let hs = hall_with(&[(day(1), day(10))]);
        let q = GapQuery::new(Span::new(day(3), day(5))).not_before(day(3));
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert!(!got.is_empty());
        assert!(got[0].start >= day(10));
        assert_eq!(got[0], DateRange { start: day(10), end: day(12) });
    }

    #[test]
    fn unclamped_search_offers_the_gap_before_first_reservation() {
        let hs = hall_with(&[(day(1), day(10))]);
        let q = GapQuery::new(Span::new(day(3), day(5)));
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].start, day(3) - 30 * D);
        assert_eq!(got[1].start, day(10));
    }

    #[test]
    fn bounds_clamp_the_window() {
        let hs = hall_with(&[(100 * D, 110 * D)]);
        let q = GapQuery::new(Span::new(105 * D, 107 * D)).within(Span::new(95 * D, 111 * D));
        // Before gap [95D, 100D) fits 2 days; after gap [110D, 111D) does not.
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(got, vec![DateRange { start: 95 * D, end: 97 * D }]);
    }

    #[test]
    fn empty_window_with_request_in_the_past_falls_back_to_earliest_fit() {
        let hs = hall_with(&[]);
        let q = GapQuery::new(Span::new(10 * D, 12 * D)).not_before(11 * D);
        let got: Vec<_> = gaps_in(&hs, &q).collect();
        assert_eq!(got, vec![DateRange { start: 11 * D, end: 13 * D }]);
    }

    #[test]
    fn degenerate_window_yields_nothing() {
        let hs = hall_with(&[]);
        let q = GapQuery::new(Span::new(10 * D, 12 * D)).within(Span::new(50 * D, 60 * D));
        assert_eq!(gaps_in(&hs, &q).count(), 0);
    }

    #[test]
    fn suggestions_never_conflict_and_are_ordered() {
        let spans: Vec<(Ms, Ms)> = (0..20)
            .map(|i| (i * 7 * D + (i % 3) * D, i * 7 * D + 4 * D))
            .collect();
        let hs = hall_with(&spans);
        for len in 1..6 {
            let q = GapQuery::new(Span::new(60 * D, 60 * D + len * D)).search_days(90, 90);
            let got: Vec<_> = gaps_in(&hs, &q).collect();
            assert!(got.len() <= spans.len() + 1);
            for w in got.windows(2) {
                assert!(w[0].start < w[1].start);
            }
            for s in &got {
                assert!(!has_conflict(&hs, &Span::from(*s), None), "{s:?} conflicts");
            }
        }
    }

    #[test]
    fn iterator_is_lazy_and_fused() {
        let busy = vec![Span::new(10, 20), Span::new(30, 40), Span::new(50, 60)];
        let q = GapQuery {
            requested: Span::new(0, 5),
            search_before: 0,
            search_after: 100,
            not_before: Ms::MIN,
            bounds: Span { start: Ms::MIN, end: Ms::MAX },
        };
        let mut pulled = 0;
        let mut gaps = Gaps::new(
            busy.into_iter().inspect(|_| pulled += 1),
            &q,
        );
        assert_eq!(gaps.next(), Some(DateRange { start: 0, end: 5 }));
        drop(gaps);
        assert_eq!(pulled, 1);

        let mut gaps = Gaps::new(std::iter::empty(), &GapQuery::new(Span::new(0, 5)));
        assert!(gaps.next().is_some());
        assert!(gaps.next().is_none());
        assert!(gaps.next().is_none());
    }
}
