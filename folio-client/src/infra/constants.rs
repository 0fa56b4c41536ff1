//! Constants module for centralized configuration values

use std::time::Duration;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub mod routes {
    /// Suffix stripped from the configured base url before appending
    /// [`MULTIPLEXED_EVENTS`].
    pub const API_SUFFIX: &str = "/api";
    /// Catalog-wide multiplexed event stream.
    pub const MULTIPLEXED_EVENTS: &str = "/sse";
    /// Job-only event stream, relative to the api base.
    pub const JOB_EVENTS: &str = "/jobs/listen";
}

pub mod stream {
    use std::time::Duration;

    /// Fixed pause between a dropped connection and the next attempt.
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
    /// Frame data the server sends to keep idle connections alive.
    pub const KEEPALIVE: &str = "keepalive";
}

pub mod jobs {
    use std::time::Duration;

    /// How long a completed job stays visible before removal.
    pub const COMPLETION_GRACE: Duration = Duration::from_millis(500);
    /// Above this many tasks, progress events are sampled.
    pub const PROGRESS_TASK_THRESHOLD: u64 = 1000;
    /// One in this many raw progress events reaches the ledger when sampling.
    pub const PROGRESS_SAMPLE_EVERY: u64 = 50;
}

pub mod invalidation {
    use std::time::Duration;

    pub const COMPLETION_DELAY: Duration = Duration::from_millis(500);
    /// Gives the server time to derive a thumbnail for new media before
    /// listings are refetched.
    pub const CREATION_DELAY: Duration = Duration::from_millis(250);
    /// Upper bound on how far repeated requests can push back one
    /// partition's invalidation.
    pub const MAX_DEBOUNCE_WAIT: Duration = Duration::from_secs(2);
}

pub mod defaults {
    pub const SERVER_URL: &str = "http://localhost:10801/api";
    pub const CONFIG_DIR: &str = "folio";
    pub const CONFIG_FILE: &str = "config.json";
    pub const SERVER_URL_ENV: &str = "FOLIO_SERVER_URL";
    pub const API_TOKEN_ENV: &str = "FOLIO_API_TOKEN";
}
