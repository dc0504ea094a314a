/// Maximum compare-and-swap attempts for a single summary write.
pub const MAX_CAS_RETRIES: u32 = 20;

/// Default page size for summary listings.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Upper bound on page size for summary listings.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Returned by the lookup endpoint when nothing matches.
pub const USER_NOT_FOUND_MESSAGE: &str = "User not found or has no data.";
