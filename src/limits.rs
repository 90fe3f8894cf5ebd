use crate::model::{DAY_MS, Ms};

pub const MAX_HALLS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_HALL: usize = 100_000;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_REQUESTER_FIELD_LEN: usize = 255;

/// 1970-01-01.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_214_400_000;

/// A single reservation may not exceed ten years.
pub const MAX_SPAN_DURATION_MS: Ms = 3_660 * DAY_MS;
/// Widest window accepted by utilization reports.
pub const MAX_QUERY_WINDOW_MS: Ms = 3_660 * DAY_MS;
/// Widest look-around accepted on either side of a suggestion request.
pub const MAX_SEARCH_DAYS: i64 = 366;
