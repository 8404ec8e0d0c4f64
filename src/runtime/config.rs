//! Core configuration types.
//!
//! These types hold the concrete values that drive scheduler and stream
//! behavior. In most cases you should use [`CoreBuilder`](super::builder::CoreBuilder)
//! rather than creating a [`CoreConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `buffer_size` | 64 KiB |
//! | `events_capacity` | 256 |

/// Default buffered-stream threshold and inner read size.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 16;

/// Default number of readiness events collected per reactor poll.
pub const DEFAULT_EVENTS_CAPACITY: usize = 256;

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Default `buffer_size` for buffered streams and default `copy_to`
    /// chunk size.
    pub buffer_size: usize,
    /// Capacity of the reactor event list.
    pub events_capacity: usize,
}

impl CoreConfig {
    /// Normalize configuration values to safe defaults.
    ///
    /// A zero `buffer_size` falls back to the default; any other value is
    /// rounded up to the next power of two.
    pub fn normalize(&mut self) {
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        self.buffer_size = self.buffer_size.next_power_of_two();
        if self.events_capacity == 0 {
            self.events_capacity = 1;
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn default_config_sane() {
        init_test("default_config_sane");
        let config = CoreConfig::default();
        crate::assert_with_log!(
            config.buffer_size == 65536,
            "buffer_size",
            65536,
            config.buffer_size
        );
        crate::assert_with_log!(
            config.buffer_size.is_power_of_two(),
            "buffer_size power of two",
            true,
            config.buffer_size.is_power_of_two()
        );
        crate::test_complete!("default_config_sane");
    }

    #[test]
    fn normalize_enforces_minimums() {
        init_test("normalize_enforces_minimums");
        let mut config = CoreConfig {
            buffer_size: 0,
            events_capacity: 0,
        };
        config.normalize();
        crate::assert_with_log!(
            config.buffer_size == DEFAULT_BUFFER_SIZE,
            "buffer_size",
            DEFAULT_BUFFER_SIZE,
            config.buffer_size
        );
        crate::assert_with_log!(
            config.events_capacity == 1,
            "events_capacity",
            1,
            config.events_capacity
        );
        crate::test_complete!("normalize_enforces_minimums");
    }

    #[test]
    fn normalize_rounds_buffer_size() {
        init_test("normalize_rounds_buffer_size");
        let mut config = CoreConfig {
            buffer_size: 1000,
            events_capacity: 16,
        };
        config.normalize();
        crate::assert_with_log!(
            config.buffer_size == 1024,
            "buffer_size",
            1024,
            config.buffer_size
        );
        crate::assert_with_log!(
            config.events_capacity == 16,
            "events_capacity",
            16,
            config.events_capacity
        );
        crate::test_complete!("normalize_rounds_buffer_size");
    }
}
