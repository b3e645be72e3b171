//! Database configuration.

/// Options controlling how an object database opens and persists state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Create the snapshot file if it does not exist. When false, opening
    /// a missing path is an error.
    pub create_if_missing: bool,
    /// Call `sync` on the backend after every flush.
    pub sync_on_flush: bool,
    /// Maximum number of undo states retained on the stack. Older states
    /// are discarded silently, bounding how far back a reorganization can
    /// reach.
    pub max_undo_depth: usize,
}

impl Config {
    /// Sets [`Config::create_if_missing`].
    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets [`Config::sync_on_flush`].
    #[must_use]
    pub fn sync_on_flush(mut self, sync: bool) -> Self {
        self.sync_on_flush = sync;
        self
    }

    /// Sets [`Config::max_undo_depth`].
    #[must_use]
    pub fn max_undo_depth(mut self, depth: usize) -> Self {
        self.max_undo_depth = depth;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_flush: true,
            max_undo_depth: 1024,
        }
    }
}
