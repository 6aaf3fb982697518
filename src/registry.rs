//! # Logger Registry
//!
//! A process-wide, dynamically growing set of named loggers, filtered
//! against rule lists. Registration and reconfiguration are serialized by
//! one mutex; level reads are lock-free so the producer submission path
//! never blocks on registry contention to decide whether a record is
//! worth building at all.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::levels::Level;

struct LoggerInner {
    name: String,
    level: AtomicU8,
}

/// A named filter. Cheap to clone (an `Arc` handle); `level` may be
/// mutated concurrently by `configure` while producers read it lock-free.
#[derive(Clone)]
pub struct Logger(Arc<LoggerInner>);

impl Logger {
    /// Creates a standalone logger at the given level. Call `registry::register`
    /// to make it visible to `configure`.
    pub fn new(name: impl Into<String>, level: Level) -> Logger {
        Logger(Arc::new(LoggerInner {
            name: name.into(),
            level: AtomicU8::new(level as u8),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Reads the logger's current level without locking. A torn read
    /// mis-filters at most one record, which is acceptable (see `is_enabled_for`).
    pub fn level(&self) -> Level {
        Level::from_u8(self.0.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.0.level.store(level as u8, Ordering::Relaxed);
    }

    /// `level <= self.level()`, callable without locking the registry.
    pub fn is_enabled_for(&self, level: Level) -> bool {
        level <= self.level()
    }

    fn ptr_eq(&self, other: &Logger) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

static REGISTRY: Lazy<Mutex<Vec<Logger>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Appends `logger` to the process-wide set. Names need not be unique.
pub fn register(logger: Logger) {
    REGISTRY.lock().push(logger);
}

/// Removes the first registered logger that is the same instance as `logger`.
/// A no-op if `logger` was never registered (e.g. already unregistered).
pub fn unregister(logger: &Logger) {
    let mut set = REGISTRY.lock();
    if let Some(pos) = set.iter().position(|l| l.ptr_eq(logger)) {
        set.remove(pos);
    }
}

/// Returns a copy of the currently registered loggers. The returned `Logger`
/// handles remain live and share state with the registry, so level changes
/// made after the snapshot is taken are still visible through them.
pub fn snapshot() -> Vec<Logger> {
    REGISTRY.lock().clone()
}

/// Applies an ordered rule list `(name-prefix, level)` to every registered
/// logger: for each logger, the last rule whose prefix matches its name
/// (by `str::starts_with`) wins. An empty prefix matches every logger.
/// Duplicate logger names apply the same winning rule to each duplicate.
pub fn configure(rules: &[(String, Level)]) {
    let set = REGISTRY.lock();
    for logger in set.iter() {
        let mut winner: Option<Level> = None;
        for (prefix, level) in rules {
            if logger.name().starts_with(prefix.as_str()) {
                winner = Some(*level);
            }
        }
        if let Some(level) = winner {
            logger.set_level(level);
        }
    }
}

/// Removes every registered logger. Intended for test teardown and for
/// `finalize`'s "free per-process strings" step.
pub fn clear() {
    REGISTRY.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        clear();
    }

    #[test]
    fn test_register_and_snapshot() {
        reset();
        let a = Logger::new("a", Level::Info);
        register(a.clone());
        let snap = snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name(), "a");
    }

    #[test]
    fn test_unregister_removes_instance() {
        reset();
        let a = Logger::new("a", Level::Info);
        let b = Logger::new("a", Level::Info); // duplicate name, distinct instance
        register(a.clone());
        register(b.clone());
        assert_eq!(snapshot().len(), 2);
        unregister(&a);
        let snap = snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap[0].ptr_eq(&b));
    }

    #[test]
    fn test_is_enabled_for_no_lock_needed() {
        let logger = Logger::new("x", Level::Output);
        assert!(logger.is_enabled_for(Level::Error));
        assert!(logger.is_enabled_for(Level::Output));
        assert!(!logger.is_enabled_for(Level::Debug));
    }

    #[test]
    fn test_configure_prefix_matching_last_wins() {
        reset();
        let a_b_x = Logger::new("a.b.x", Level::Debug);
        let a_c = Logger::new("a.c", Level::Debug);
        let a_b = Logger::new("a.b", Level::Debug);
        let z = Logger::new("z", Level::Debug);
        register(a_b_x.clone());
        register(a_c.clone());
        register(a_b.clone());
        register(z.clone());

        configure(&[
            (String::new(), Level::Lowest),
            ("a".to_string(), Level::Output),
            ("a.b".to_string(), Level::Warning),
        ]);

        assert_eq!(a_b_x.level(), Level::Warning);
        assert_eq!(a_c.level(), Level::Output);
        assert_eq!(a_b.level(), Level::Warning);
        assert_eq!(z.level(), Level::Lowest);

        assert!(!a_b_x.is_enabled_for(Level::Info));
        assert!(!a_c.is_enabled_for(Level::Debug));
        assert!(a_b.is_enabled_for(Level::Warning));
        assert!(z.is_enabled_for(Level::Debug));
    }

    #[test]
    fn test_configure_empty_prefix_matches_all() {
        reset();
        let l = Logger::new("anything", Level::Error);
        register(l.clone());
        configure(&[(String::new(), Level::Trace)]);
        assert_eq!(l.level(), Level::Trace);
    }

    #[test]
    fn test_duplicate_names_both_reconfigured() {
        reset();
        let a1 = Logger::new("dup", Level::Error);
        let a2 = Logger::new("dup", Level::Error);
        register(a1.clone());
        register(a2.clone());
        configure(&[("dup".to_string(), Level::Trace)]);
        assert_eq!(a1.level(), Level::Trace);
        assert_eq!(a2.level(), Level::Trace);
    }
}
