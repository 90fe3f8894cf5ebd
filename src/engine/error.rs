use ulid::Ulid;

use crate::dates::format_ms;
use crate::model::{DateRange, Ms};

#[derive(Debug)]
pub enum EngineError {
    HallNotFound(Ulid),
    ReservationNotFound(Ulid),
    AlreadyExists(Ulid),
    /// The candidate overlaps reservation `with`; `suggestions` may be empty.
    Conflict {
        with: Ulid,
        suggestions: Vec<DateRange>,
    },
    HasReservations(Ulid),
    InvalidSpan { start: Ms, end: Ms },
    InvalidRate(f64),
    InvalidCapacity,
    InvalidWindow { start: Ms, end: Ms },
    StartInPast { start: Ms, now: Ms },
    OutsideAvailability { hall_id: Ulid },
    LimitExceeded(&'static str),
    StorageUnavailable(String),
}

impl EngineError {
    /// Malformed or logically invalid input; never worth retrying.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidSpan { .. }
                | EngineError::InvalidRate(_)
                | EngineError::InvalidCapacity
                | EngineError::StartInPast { .. }
                | EngineError::OutsideAvailability { .. }
                | EngineError::LimitExceeded(_)
        )
    }

    /// Only storage failures are transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::StorageUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::HallNotFound(id) => write!(f, "hall not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict { with, suggestions } => {
                write!(f, "hall is already booked for these dates (conflicts with {with})")?;
                if !suggestions.is_empty() {
                    write!(f, "; suggestions:")?;
                    for s in suggestions {
                        write!(f, " [{}, {})", format_ms(s.start), format_ms(s.end))?;
                    }
                }
                Ok(())
            }
            EngineError::HasReservations(id) => {
                write!(f, "cannot delete hall {id}: reservations still reference it")
            }
            EngineError::InvalidSpan { start, end } => {
                write!(f, "start must be before end (start={start}, end={end})")
            }
            EngineError::InvalidRate(rate) => {
                write!(f, "rate per day must be a positive number, got {rate}")
            }
            EngineError::InvalidCapacity => write!(f, "capacity must be positive"),
            EngineError::InvalidWindow { start, end } => {
                write!(f, "window end {end} is before window start {start}")
            }
            EngineError::StartInPast { start, now } => {
                write!(f, "start {} cannot be in the past (now {})", format_ms(*start), format_ms(*now))
            }
            EngineError::OutsideAvailability { hall_id } => {
                write!(f, "requested dates fall outside the availability window of hall {hall_id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageUnavailable(e) => write!(f, "storage unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
