//! Timing and scan constants

/// Attach polling and relaunch timing
pub mod attach {
    use std::time::Duration;

    /// Deadline for a single attach call
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Delay between process lookups while waiting for the game
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// How long to poll unsuccessfully before asking for a relaunch
    pub const RELAUNCH_AFTER: Duration = Duration::from_secs(5);

    /// Time given to the relaunch collaborator to bring the game up
    pub const RELAUNCH_TIMEOUT: Duration = Duration::from_secs(90);

    /// Minimum interval between two relaunches
    pub const RELAUNCH_COOLDOWN: Duration = Duration::from_secs(60);

    /// Bytes read at the module base to confirm a handle is usable
    pub const PROBE_LEN: usize = 2;
}

/// Relaunch command behaviour
pub mod relaunch {
    use std::time::Duration;

    /// Delay between process lookups after spawning the launcher
    pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// Extra wait after the process appears, while it loads its data
    pub const SETTLE_DELAY: Duration = Duration::from_secs(15);
}

/// Module signature scanning
pub mod scan {
    /// Bytes read per chunk while scanning a module image (4MB)
    pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

    /// Modules are never scanned past this size (512MB)
    pub const MAX_MODULE_SIZE: usize = 512 * 1024 * 1024;

    /// Resolved root pointers below this are treated as null
    pub const MIN_ROOT_ADDRESS: u64 = 0x10000;
}

/// Character slot enumeration
pub mod catalog {
    /// Upper bound on slot counts; larger values mean the count was read
    /// from a structure that is not initialised yet
    pub const MAX_SLOTS: usize = 4096;
}
