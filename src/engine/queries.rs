use std::cmp::Ordering;

use ulid::Ulid;

use crate::dates::start_of_day;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{has_conflict, validate_span};
use super::gaps::{gaps_in, GapQuery};
use super::utilization::utilization;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_hall(&self, id: Ulid) -> Result<HallSettings, EngineError> {
        let hs = self.hall(&id)?;
        let guard = hs.read().await;
        Ok(guard.settings())
    }

    /// All halls, ordered by id.
    pub async fn list_halls(&self) -> Vec<HallSettings> {
        let mut out = Vec::with_capacity(self.store.hall_count());
        for id in self.store.hall_ids() {
            if let Some(hs) = self.store.get_hall(&id) {
                out.push(hs.read().await.settings());
            }
        }
        out
    }

    /// `true` when `[start, end)` overlaps a reservation of the hall other than `exclude`.
    pub async fn check_conflict(
        &self,
        hall_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = validate_span(start, end)?;
        let hs = self.hall(&hall_id)?;
        let guard = hs.read().await;
        Ok(has_conflict(&guard, &span, exclude))
    }

    /// Free windows with the length of `[start, end)` around the requested range,
    /// using the configured search distance on each side.
    pub async fn suggest(&self, hall_id: Ulid, start: Ms, end: Ms) -> Result<Vec<DateRange>, EngineError> {
        self.suggest_within(
            hall_id,
            start,
            end,
            self.config.search_before_days,
            self.config.search_after_days,
        )
        .await
    }

    pub async fn suggest_within(
        &self,
        hall_id: Ulid,
        start: Ms,
        end: Ms,
        search_before_days: i64,
        search_after_days: i64,
    ) -> Result<Vec<DateRange>, EngineError> {
        let span = validate_span(start, end)?;
        if !(0..=MAX_SEARCH_DAYS).contains(&search_before_days)
            || !(0..=MAX_SEARCH_DAYS).contains(&search_after_days)
        {
            return Err(EngineError::LimitExceeded("search window too wide"));
        }
        let hs = self.hall(&hall_id)?;
        let guard = hs.read().await;
        let query = self
            .gap_query(&guard, &span)
            .search_days(search_before_days, search_after_days);
        let out: Vec<DateRange> = gaps_in(&guard, &query).collect();
        metrics::histogram!(observability::SUGGESTIONS_RETURNED).record(out.len() as f64);
        Ok(out)
    }

    fn gap_query(&self, hall: &HallState, requested: &Span) -> GapQuery {
        GapQuery::new(*requested)
            .search_days(self.config.search_before_days, self.config.search_after_days)
            .not_before(start_of_day(self.now_ms()))
            .within(hall.availability_bounds())
    }

    /// Alternatives attached to a conflict error. Caller holds the hall lock.
    pub(super) fn suggestions_for(&self, hall: &HallState, requested: &Span) -> Vec<DateRange> {
        let out: Vec<DateRange> = gaps_in(hall, &self.gap_query(hall, requested)).collect();
        metrics::histogram!(observability::SUGGESTIONS_RETURNED).record(out.len() as f64);
        out
    }

    /// Day-level utilization of a hall. Without a window, the trailing
    /// configured number of days ending today is used.
    pub async fn get_utilization(
        &self,
        hall_id: Ulid,
        window: Option<(Ms, Ms)>,
    ) -> Result<UtilizationReport, EngineError> {
        let (start, end) = window.unwrap_or_else(|| {
            let today = start_of_day(self.now_ms());
            let days = self.config.utilization_days.max(1);
            (today.saturating_sub((days - 1).saturating_mul(DAY_MS)), today)
        });
        let hs = self.hall(&hall_id)?;
        let guard = hs.read().await;
        utilization(&guard, start, end)
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let hall_id = self
            .store
            .hall_for_reservation(&id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let hs = self.hall(&hall_id)?;
        let guard = hs.read().await;
        guard
            .get_reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Reservations of one hall overlapping `range`, or all of them, in start order.
    pub async fn hall_reservations(
        &self,
        hall_id: Ulid,
        range: Option<Span>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let hs = self.hall(&hall_id)?;
        let guard = hs.read().await;
        Ok(match range {
            Some(range) => guard.overlapping(&range).cloned().collect(),
            None => guard.reservations.clone(),
        })
    }

    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, EngineError> {
        let hall_ids = match filter.hall_id {
            Some(id) => {
                if !self.store.contains_hall(&id) {
                    return Err(EngineError::HallNotFound(id));
                }
                vec![id]
            }
            None => self.store.hall_ids(),
        };
        let company = filter.company.as_deref().map(str::to_lowercase);
        let now = self.now_ms();

        let mut out = Vec::new();
        for id in hall_ids {
            let Some(hs) = self.store.get_hall(&id) else {
                continue;
            };
            let guard = hs.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| filter.covers.is_none_or(|t| r.span.contains_instant(t)))
                    .filter(|r| filter.status.is_none_or(|s| ReservationStatus::of(&r.span, now) == s))
                    .filter(|r| {
                        company
                            .as_deref()
                            .is_none_or(|c| r.requester.company.to_lowercase() == c)
                    })
                    .cloned(),
            );
        }

        out.sort_by(|a, b| {
            let ord = compare_by(filter.sort_by, a, b).then_with(|| a.id.cmp(&b.id));
            if filter.descending { ord.reverse() } else { ord }
        });
        Ok(out)
    }

    /// All reservations split into past, current and upcoming relative to now.
    pub async fn categorized_reservations(&self) -> CategorizedReservations {
        let now = self.now_ms();
        let mut out = CategorizedReservations::default();
        for id in self.store.hall_ids() {
            let Some(hs) = self.store.get_hall(&id) else {
                continue;
            };
            let guard = hs.read().await;
            for r in &guard.reservations {
                let bucket = match ReservationStatus::of(&r.span, now) {
                    ReservationStatus::Past => &mut out.past,
                    ReservationStatus::Current => &mut out.current,
                    ReservationStatus::Upcoming => &mut out.upcoming,
                };
                bucket.push(r.clone());
            }
        }
        for bucket in [&mut out.past, &mut out.current, &mut out.upcoming] {
            bucket.sort_by(|a, b| compare_by(SortKey::Start, a, b).then_with(|| a.id.cmp(&b.id)));
        }
        out
    }

    /// Counts of past, current and upcoming reservations relative to now, plus revenue.
    pub async fn reservation_summary(&self) -> ReservationSummary {
        let lists = self.categorized_reservations().await;
        let revenue = [&lists.past, &lists.current, &lists.upcoming]
            .into_iter()
            .flatten()
            .map(|r| r.total_cost)
            .sum();
        ReservationSummary {
            total: lists.past.len() + lists.current.len() + lists.upcoming.len(),
            past: lists.past.len(),
            current: lists.current.len(),
            upcoming: lists.upcoming.len(),
            revenue,
        }
    }
}

fn compare_by(key: SortKey, a: &Reservation, b: &Reservation) -> Ordering {
    match key {
        SortKey::Start => a.span.start.cmp(&b.span.start),
        SortKey::End => a.span.end.cmp(&b.span.end),
        SortKey::Company => a
            .requester
            .company
            .to_lowercase()
            .cmp(&b.requester.company.to_lowercase()),
        SortKey::HallId => a
            .hall_id
            .cmp(&b.hall_id)
            .then(a.span.start.cmp(&b.span.start)),
    }
}
