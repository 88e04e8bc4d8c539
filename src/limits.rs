use crate::model::Ms;

/// Timestamps must fall in `[2000-01-01, 2100-01-01)` UTC. Anything outside
/// is a client bug, not a booking.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking longer than a year is rejected.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

/// Free-text field ceilings.
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_COMMENT_LEN: usize = 4096;

/// `limit` query values above this are clamped.
pub const MAX_PAGE_LIMIT: usize = 1000;
