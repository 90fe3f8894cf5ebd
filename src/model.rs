use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// One calendar day in milliseconds.
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input: `None` unless `start < end`.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Billable days: partial days round up, never less than one.
    pub fn duration_days(&self) -> i64 {
        let ms = self.duration_ms().max(0);
        ((ms + DAY_MS - 1) / DAY_MS).max(1)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with `bounds`, or `None` when they do not overlap.
    pub fn clamp_to(&self, bounds: &Span) -> Option<Span> {
        Span::try_new(self.start.max(bounds.start), self.end.min(bounds.end))
    }
}

/// Who asked for a reservation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub company: String,
}

impl Requester {
    pub fn new(name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
        }
    }
}

/// A confirmed reservation of one hall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub hall_id: Ulid,
    pub span: Span,
    pub total_cost: f64,
    pub requester: Requester,
}

impl Reservation {
    pub fn duration_days(&self) -> i64 {
        self.span.duration_days()
    }

    /// Cost per billable day after any discount.
    pub fn effective_daily_cost(&self) -> f64 {
        self.total_cost / self.duration_days() as f64
    }
}

#[derive(Debug, Clone)]
pub struct HallState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Seats; informational only, a hall holds one reservation at a time.
    pub capacity: u32,
    pub rate_per_day: f64,
    /// Earliest bookable instant, unconstrained when `None`.
    pub available_from: Option<Ms>,
    /// Latest bookable instant, unconstrained when `None`.
    pub available_to: Option<Ms>,
    /// Confirmed reservations, sorted by `(span.start, id)`.
    pub reservations: Vec<Reservation>,
    /// Set under the write lock when the hall leaves the store. A writer that
    /// acquired the lock through a stale handle must see it and back off.
    pub deleted: bool,
}

impl HallState {
    pub fn new(settings: HallSettings) -> Self {
        Self {
            id: settings.id,
            name: settings.name,
            capacity: settings.capacity,
            rate_per_day: settings.rate_per_day,
            available_from: settings.available_from,
            available_to: settings.available_to,
            reservations: Vec::new(),
            deleted: false,
        }
    }

    pub fn apply_settings(&mut self, settings: HallSettings) {
        self.name = settings.name;
        self.capacity = settings.capacity;
        self.rate_per_day = settings.rate_per_day;
        self.available_from = settings.available_from;
        self.available_to = settings.available_to;
    }

    pub fn settings(&self) -> HallSettings {
        HallSettings {
            id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
            rate_per_day: self.rate_per_day,
            available_from: self.available_from,
            available_to: self.available_to,
        }
    }

    /// Bookable bounds as a span, with open ends widened to the full range.
    pub fn availability_bounds(&self) -> Span {
        Span {
            start: self.available_from.unwrap_or(Ms::MIN),
            end: self.available_to.unwrap_or(Ms::MAX),
        }
    }

    /// Insert maintaining sort order by `(span.start, id)`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let key = (reservation.span.start, reservation.id);
        let pos = self
            .reservations
            .binary_search_by_key(&key, |r| (r.span.start, r.id))
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get_reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// Administrator-controlled hall attributes, shared by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallSettings {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: u32,
    pub rate_per_day: f64,
    pub available_from: Option<Ms>,
    pub available_to: Option<Ms>,
}

/// A partial hall update. `None` leaves a column alone; `Some(None)` clears
/// a nullable one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HallChanges {
    pub name: Option<Option<String>>,
    pub capacity: Option<u32>,
    pub rate_per_day: Option<f64>,
    pub available_from: Option<Option<Ms>>,
    pub available_to: Option<Option<Ms>>,
}

impl HallChanges {
    pub fn apply_to(self, mut settings: HallSettings) -> HallSettings {
        if let Some(name) = self.name {
            settings.name = name;
        }
        if let Some(capacity) = self.capacity {
            settings.capacity = capacity;
        }
        if let Some(rate) = self.rate_per_day {
            settings.rate_per_day = rate;
        }
        if let Some(from) = self.available_from {
            settings.available_from = from;
        }
        if let Some(to) = self.available_to {
            settings.available_to = to;
        }
        settings
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    HallCreated(HallSettings),
    HallUpdated(HallSettings),
    HallDeleted {
        id: Ulid,
    },
    ReservationConfirmed {
        id: Ulid,
        hall_id: Ulid,
        span: Span,
        total_cost: f64,
        requester: Requester,
    },
    ReservationModified {
        id: Ulid,
        hall_id: Ulid,
        span: Span,
        total_cost: f64,
    },
    ReservationCancelled {
        id: Ulid,
        hall_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// A free window offered after a booking conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Ms,
    pub end: Ms,
}

impl From<DateRange> for Span {
    fn from(r: DateRange) -> Self {
        Span::new(r.start, r.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationReport {
    pub hall_id: Ulid,
    pub window_start: Ms,
    pub window_end: Ms,
    pub booked_days: i64,
    pub total_days: i64,
    /// Percentage in `[0, 100]`.
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationSummary {
    pub total: usize,
    pub past: usize,
    pub current: usize,
    pub upcoming: usize,
    pub revenue: f64,
}

/// Where a reservation sits relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    /// Ended at or before now.
    Past,
    /// Started at or before now and not yet ended.
    Current,
    Upcoming,
}

impl ReservationStatus {
    pub fn of(span: &Span, now: Ms) -> Self {
        if span.end <= now {
            Self::Past
        } else if span.start <= now {
            Self::Current
        } else {
            Self::Upcoming
        }
    }
}

/// Every reservation split by status, each list ordered by start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedReservations {
    pub past: Vec<Reservation>,
    pub current: Vec<Reservation>,
    pub upcoming: Vec<Reservation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Start,
    End,
    Company,
    HallId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub hall_id: Option<Ulid>,
    /// Case-insensitive exact match on the requester's company.
    pub company: Option<String>,
    /// Keep reservations whose span contains this instant.
    pub covers: Option<Ms>,
    pub status: Option<ReservationStatus>,
    pub sort_by: SortKey,
    pub descending: bool,
}
