/// Source language when the config does not name one.
pub const DEFAULT_RECOGNITION_LANGUAGE: &str = "en-US";

/// Translation target when the config does not name any.
pub const DEFAULT_TARGET_LANGUAGE: &str = "uk";

/// Timeout applied to token and publish requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Period of the synthetic output loop
pub const DEFAULT_TEST_OUTPUT_INTERVAL_SECS: u64 = 3;
