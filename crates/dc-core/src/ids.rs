//! Synthetic element identity.
//!
//! Ids only need to be unique within one canvas session. Generators are
//! injected into the converter so that tests can pin them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Index shared by every live generator, so ids stay unique across parses
/// that start in the same millisecond.
static PROCESS_INDEX: AtomicUsize = AtomicUsize::new(0);

/// Source of element ids.
pub trait IdGenerator {
    /// Produce the next id. Must not repeat within one generator.
    fn next_id(&mut self) -> String;
}

impl<G: IdGenerator + ?Sized> IdGenerator for Box<G> {
    fn next_id(&mut self) -> String {
        (**self).next_id()
    }
}

/// Id of the label bound to `container_id`.
#[must_use]
pub fn text_id_for(container_id: &str) -> String {
    format!("{container_id}-text")
}

/// Yields `gen-<millis>-<index>` where `millis` is captured once at
/// construction.
///
/// Live generators draw the index from a process-wide counter. Generators
/// built with [`TimestampIdGenerator::at`] count from zero on their own.
#[derive(Debug, Clone)]
pub struct TimestampIdGenerator {
    millis: u128,
    next_index: Option<usize>,
}

impl TimestampIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        Self::shared_at(millis)
    }

    /// Live generator for a caller-supplied clock reading.
    #[must_use]
    pub const fn shared_at(millis: u128) -> Self {
        Self {
            millis,
            next_index: None,
        }
    }

    /// Generator pinned to a given timestamp, with its own index.
    #[must_use]
    pub const fn at(millis: u128) -> Self {
        Self {
            millis,
            next_index: Some(0),
        }
    }
}

impl Default for TimestampIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&mut self) -> String {
        let index = match &mut self.next_index {
            Some(next) => {
                let index = *next;
                *next += 1;
                index
            }
            None => PROCESS_INDEX.fetch_add(1, Ordering::Relaxed),
        };
        format!("gen-{}-{index}", self.millis)
    }
}

/// Deterministic `<prefix>-<index>` ids.
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    prefix: String,
    next_index: usize,
}

impl SequentialIdGenerator {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_index: 0,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next_index);
        self.next_index += 1;
        id
    }
}
