//! In-process diagnostics event bus.
//!
//! Semantic services publish structured events (a name, a JSON payload and a
//! severity level) so that tooling can observe type mismatches and other
//! findings without the services knowing who is listening. Publishing never
//! alters the publisher's control flow.

use std::fmt;
use std::time::SystemTime;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Event severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(s)
    }
}

/// A published diagnostics event.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: Value,
    pub level: Level,
    pub timestamp: SystemTime,
}

type Handler = Box<dyn Fn(&Event)>;

struct Subscription {
    handler: Handler,
    /// Per-subscriber filter; `None` accepts everything the bus lets through.
    min_level: Option<Level>,
}

/// A synchronous, single-threaded event bus keyed by event name.
pub struct EventBus {
    handlers: FxHashMap<String, Vec<Subscription>>,
    min_level: Level,
}

impl EventBus {
    /// Create a bus that delivers events of every level.
    pub fn new() -> Self {
        Self::with_min_level(Level::Debug)
    }

    /// Create a bus that drops events below `min_level` before dispatch.
    pub fn with_min_level(min_level: Level) -> Self {
        EventBus {
            handlers: FxHashMap::default(),
            min_level,
        }
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn set_min_level(&mut self, level: Level) {
        self.min_level = level;
    }

    /// Subscribe `handler` to every event named `name`.
    pub fn subscribe<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Event) + 'static,
    {
        self.add_subscription(name.into(), Box::new(handler), None);
    }

    /// Subscribe `handler` to events named `name` at or above `min_level`.
    pub fn subscribe_with_level<F>(&mut self, name: impl Into<String>, min_level: Level, handler: F)
    where
        F: Fn(&Event) + 'static,
    {
        self.add_subscription(name.into(), Box::new(handler), Some(min_level));
    }

    fn add_subscription(&mut self, name: String, handler: Handler, min_level: Option<Level>) {
        self.handlers
            .entry(name)
            .or_default()
            .push(Subscription { handler, min_level });
    }

    /// Publish an event. Returns the number of handlers that received it.
    pub fn publish(&self, name: &str, payload: Value, level: Level) -> usize {
        if level < self.min_level {
            return 0;
        }
        let Some(subs) = self.handlers.get(name) else {
            return 0;
        };

        let event = Event {
            name: name.to_string(),
            payload,
            level,
            timestamp: SystemTime::now(),
        };

        let mut delivered = 0;
        for sub in subs {
            if sub.min_level.is_some_and(|min| level < min) {
                continue;
            }
            (sub.handler)(&event);
            delivered += 1;
        }
        trace!(event = name, %level, delivered, "published event");
        delivered
    }

    pub fn debug(&self, name: &str, payload: Value) -> usize {
        self.publish(name, payload, Level::Debug)
    }

    pub fn info(&self, name: &str, payload: Value) -> usize {
        self.publish(name, payload, Level::Info)
    }

    pub fn warning(&self, name: &str, payload: Value) -> usize {
        self.publish(name, payload, Level::Warning)
    }

    pub fn error(&self, name: &str, payload: Value) -> usize {
        self.publish(name, payload, Level::Error)
    }

    /// Number of handlers subscribed to `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    /// Drop the handlers for `name`, or every handler when `name` is `None`.
    pub fn clear_handlers(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.handlers.remove(name);
            }
            None => self.handlers.clear(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("EventBus")
            .field("min_level", &self.min_level)
            .field("events", &names)
            .finish()
    }
}
