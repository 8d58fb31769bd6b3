/// Unit tests for the pure parts of habit-sync: streak engine, limit policy,
/// domain validation and local record repair

mod domain_tests;
mod limits_tests;
mod streak_tests;
