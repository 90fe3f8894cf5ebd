use crate::limits::{MAX_QUERY_WINDOW_MS, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;

use super::EngineError;

/// Share of days in `[window_start, window_end]` covered by confirmed reservations.
///
/// Both boundary days count, so a window from June 1 to June 30 (midnights)
/// is 30 days long. A reservation occupies every day slot it touches after
/// clamping to the window; slots are merged so a day is never counted twice.
pub fn utilization(
    hall: &HallState,
    window_start: Ms,
    window_end: Ms,
) -> Result<UtilizationReport, EngineError> {
    if window_end < window_start {
        return Err(EngineError::InvalidWindow {
            start: window_start,
            end: window_end,
        });
    }
    if window_start < MIN_VALID_TIMESTAMP_MS || window_end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("utilization window out of range"));
    }
    if window_end - window_start > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("utilization window too wide"));
    }

    let total_days = (window_end - window_start) / DAY_MS + 1;
    let window = Span::new(window_start, window_start + total_days * DAY_MS);

    let mut booked_days = 0;
    let mut covered_until = 0;
    for r in hall.overlapping(&window) {
        let Some(clamped) = r.span.clamp_to(&window) else {
            continue;
        };
        let first = (clamped.start - window_start) / DAY_MS;
        let last = (clamped.end - window_start + DAY_MS - 1) / DAY_MS;
        let from = first.max(covered_until);
        if last > from {
            booked_days += last - from;
        }
        covered_until = covered_until.max(last);
    }

    Ok(UtilizationReport {
        hall_id: hall.id,
        window_start,
        window_end,
        booked_days,
        total_days,
        rate: booked_days as f64 / total_days as f64 * 100.0,
    })
}
