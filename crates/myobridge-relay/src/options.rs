//! [`OptionStore`] – owner of the active [`Options`] snapshot.
//!
//! Options are immutable once built.  Applying a new configuration resolves
//! it into a fresh [`Options`], swaps the shared reference and bumps the
//! generation counter; readers holding the old `Arc` keep a consistent view
//! of the previous generation.

use std::sync::Arc;

use myobridge_types::{Options, OptionsConfig};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct OptionStore {
    current: Arc<Options>,
    generation: u64,
}

impl Default for OptionStore {
    fn default() -> Self {
        Self {
            current: Arc::new(Options::default()),
            generation: 0,
        }
    }
}

impl OptionStore {
    /// Build a store whose first generation is resolved from `config`.
    pub fn new(config: &OptionsConfig) -> Self {
        let mut store = Self::default();
        store.apply(config);
        store
    }

    /// The options currently in force.
    pub fn current(&self) -> Arc<Options> {
        Arc::clone(&self.current)
    }

    /// Number of times options have been applied.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the current options wholesale.
    ///
    /// Never fails: an invalid interval keeps the interval currently in
    /// force, every other absent field takes its default.
    pub fn apply(&mut self, config: &OptionsConfig) -> Arc<Options> {
        let prior = self.current.interval;
        let next = Options::resolve(config, prior);
        if let Some(raw) = &config.interval
            && raw.duration().is_none()
        {
            warn!(interval = ?raw, kept_ms = prior.as_millis() as u64, "invalid interval; keeping previous value");
        }

        self.current = Arc::new(next);
        self.generation += 1;
        debug!(
            generation = self.generation,
            device_id = self.current.device_id,
            interval_ms = self.current.interval.as_millis() as u64,
            streams = ?self.current.streams,
            "options applied"
        );
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myobridge_types::{IntervalValue, StreamToggle, DEFAULT_INTERVAL};
    use std::time::Duration;

    #[test]
    fn new_store_is_first_generation() {
        let store = OptionStore::new(&OptionsConfig::default());
        assert_eq!(store.generation(), 1);
        assert_eq!(*store.current(), Options::default());
    }

    #[test]
    fn apply_replaces_wholesale() {
        let mut store = OptionStore::new(&OptionsConfig {
            id: Some(4),
            gyroscope: Some(StreamToggle { enabled: true }),
            ..OptionsConfig::default()
        });
        assert!(store.current().streams.gyroscope);

        // A reconfiguration that only mentions orientation resets the rest.
        let next = store.apply(&OptionsConfig {
            orientation: Some(StreamToggle { enabled: true }),
            ..OptionsConfig::default()
        });
        assert!(next.streams.orientation);
        assert!(!next.streams.gyroscope);
        assert_eq!(next.device_id, 0);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn old_snapshot_is_unaffected_by_apply() {
        let mut store = OptionStore::default();
        let before = store.current();
        store.apply(&OptionsConfig {
            interval: Some(IntervalValue::Millis(20)),
            ..OptionsConfig::default()
        });
        assert_eq!(before.interval, DEFAULT_INTERVAL);
        assert_eq!(store.current().interval, Duration::from_millis(20));
    }

    #[test]
    fn invalid_interval_keeps_previous_generation_interval() {
        let mut store = OptionStore::new(&OptionsConfig {
            interval: Some(IntervalValue::Millis(120)),
            ..OptionsConfig::default()
        });
        let next = store.apply(&OptionsConfig {
            interval: Some(IntervalValue::Millis(0)),
            ..OptionsConfig::default()
        });
        assert_eq!(next.interval, Duration::from_millis(120));
    }
}
