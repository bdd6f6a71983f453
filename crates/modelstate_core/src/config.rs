//! Model-state configuration.

/// Configuration for a [`crate::ModelStateManager`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of array entries in one version document.
    ///
    /// Each entity takes three entries (id, parent, version).
    pub max_array_entries: usize,

    /// A save is written as a delta only if it is this many times smaller
    /// than a full snapshot.
    pub relative_size_factor: usize,

    /// Whether `open_project` removes dangling entity documents.
    pub collect_garbage_on_open: bool,

    /// Session identifier for the default UID generator.
    pub session_id: u32,

    /// Service identifier for the default UID generator.
    pub service_id: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_array_entries: 250_000,
            relative_size_factor: 5,
            collect_garbage_on_open: true,
            session_id: 1,
            service_id: 1,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-document array entry cap.
    #[must_use]
    pub const fn max_array_entries(mut self, value: usize) -> Self {
        self.max_array_entries = value;
        self
    }

    /// Sets the delta-versus-snapshot size factor.
    #[must_use]
    pub const fn relative_size_factor(mut self, value: usize) -> Self {
        self.relative_size_factor = value;
        self
    }

    /// Sets whether garbage collection runs on open.
    #[must_use]
    pub const fn collect_garbage_on_open(mut self, value: bool) -> Self {
        self.collect_garbage_on_open = value;
        self
    }

    /// Sets the session identifier.
    #[must_use]
    pub const fn session_id(mut self, value: u32) -> Self {
        self.session_id = value;
        self
    }

    /// Sets the service identifier.
    #[must_use]
    pub const fn service_id(mut self, value: u8) -> Self {
        self.service_id = value;
        self
    }

    /// Number of entities that fit in one version document.
    #[must_use]
    pub fn entities_per_document(&self) -> usize {
        (self.max_array_entries / 3).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_array_entries, 250_000);
        assert_eq!(config.relative_size_factor, 5);
        assert!(config.collect_garbage_on_open);
        assert_eq!(config.entities_per_document(), 83_333);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_array_entries(30)
            .collect_garbage_on_open(false)
            .session_id(9)
            .service_id(2);

        assert_eq!(config.max_array_entries, 30);
        assert!(!config.collect_garbage_on_open);
        assert_eq!(config.session_id, 9);
        assert_eq!(config.service_id, 2);
        assert_eq!(config.entities_per_document(), 10);
    }

    #[test]
    fn tiny_cap_still_fits_one_entity() {
        assert_eq!(Config::new().max_array_entries(2).entities_per_document(), 1);
    }
}
