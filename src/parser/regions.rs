//! Region name resolution and event classification.
//!
//! ESMF emits `define_region` events that bind a numeric id to a name,
//! followed by `regionid_enter` / `regionid_exit` events that reference the
//! id. Names are scoped per execution unit, with a fallback map holding the
//! first name ever seen for an id in this pipeline invocation.

use super::events::{value_as_i64, TraceMessage};
use crate::utils::config::{
    DEFINE_REGION_EVENT, ENTER_MARKER, EXIT_MARKER, REGION_ENTER_EVENT, REGION_EXIT_EVENT,
    REGION_ID_FIELD_NAMES, REGION_NAME_FIELD_NAMES, TRANSITION_ID_FIELD_NAMES,
};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;

/// Direction of a region transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Exit,
}

/// An event reduced to what the span reconstructor needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub component: String,
    pub transition: Transition,
    pub timestamp_ns: u64,
}

/// Per-unit and fallback region-id -> name maps
#[derive(Debug, Default)]
pub struct RegionResolver {
    local: HashMap<u32, HashMap<i64, String>>,
    global: HashMap<i64, String>,
}

impl RegionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `name` for `unit`; existing bindings are kept
    pub fn define(&mut self, unit: u32, id: i64, name: &str) {
        self.local
            .entry(unit)
            .or_default()
            .entry(id)
            .or_insert_with(|| name.to_string());
        self.global.entry(id).or_insert_with(|| name.to_string());
    }

    /// Unit-local name, else the fallback name, else `region_<id>`
    pub fn resolve(&self, unit: u32, id: i64) -> String {
        self.local
            .get(&unit)
            .and_then(|names| names.get(&id))
            .or_else(|| self.global.get(&id))
            .cloned()
            .unwrap_or_else(|| format!("region_{}", id))
    }

    /// Classify one message from `unit`'s stream
    ///
    /// Registers region definitions as a side effect. Returns `None` for
    /// anything that is not an enter/exit transition, including events
    /// without a timestamp.
    pub fn classify<M: TraceMessage>(&mut self, unit: u32, msg: &M) -> Option<ClassifiedEvent> {
        if !msg.is_event() {
            return None;
        }
        let timestamp_ns = msg.timestamp_ns()?;
        let name = msg.name();

        let resolved = match name {
            DEFINE_REGION_EVENT => {
                self.register_definition(unit, msg);
                return None;
            }
            REGION_ENTER_EVENT | REGION_EXIT_EVENT => {
                let Some(id) = value_as_i64(msg.field_or(TRANSITION_ID_FIELD_NAMES, &Value::Null))
                else {
                    debug!("unit {}: {} without region id at {}", unit, name, timestamp_ns);
                    return None;
                };
                let marker = if name == REGION_ENTER_EVENT {
                    ENTER_MARKER
                } else {
                    EXIT_MARKER
                };
                format!("{}{}", self.resolve(unit, id), marker)
            }
            other => other.to_string(),
        };

        let (component, transition) = if let Some(c) = resolved.strip_suffix(ENTER_MARKER) {
            (c, Transition::Enter)
        } else if let Some(c) = resolved.strip_suffix(EXIT_MARKER) {
            (c, Transition::Exit)
        } else {
            return None;
        };

        Some(ClassifiedEvent {
            component: component.to_string(),
            transition,
            timestamp_ns,
        })
    }

    fn register_definition<M: TraceMessage>(&mut self, unit: u32, msg: &M) {
        let null = Value::Null;
        let id = value_as_i64(msg.field_or(REGION_ID_FIELD_NAMES, &null));
        let name = msg.field_or(REGION_NAME_FIELD_NAMES, &null);

        match (id, name.as_str()) {
            (Some(id), Some(name)) => self.define(unit, id, name),
            _ => debug!("unit {}: ignoring malformed define_region", unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::events::RawMessage;
    use serde_json::json;

    #[test]
    fn test_resolve_fallback_order() {
        let mut resolver = RegionResolver::new();
        resolver.define(0, 1, "OCN");
        resolver.define(1, 1, "ATM");

        assert_eq!(resolver.resolve(0, 1), "OCN");
        assert_eq!(resolver.resolve(1, 1), "ATM");
        // unit 2 has no local binding, falls back to the first name seen
        assert_eq!(resolver.resolve(2, 1), "OCN");
        assert_eq!(resolver.resolve(2, 9), "region_9");
    }

    #[test]
    fn test_binding_is_stable() {
        let mut resolver = RegionResolver::new();
        resolver.define(0, 1, "OCN");
        resolver.define(0, 1, "ICE");
        assert_eq!(resolver.resolve(0, 1), "OCN");
    }

    #[test]
    fn test_classify_region_transitions() {
        let mut resolver = RegionResolver::new();
        let define = RawMessage::event("define_region", 0, json!({"id": 3, "name": "[OCN] RunPhase1"}));
        assert!(resolver.classify(0, &define).is_none());

        let enter = RawMessage::event("regionid_enter", 10, json!({"regionid": 3}));
        assert_eq!(
            resolver.classify(0, &enter),
            Some(ClassifiedEvent {
                component: "[OCN] RunPhase1".to_string(),
                transition: Transition::Enter,
                timestamp_ns: 10,
            })
        );

        let exit = RawMessage::event("regionid_exit", 20, json!({"regionid": "3"}));
        let classified = resolver.classify(0, &exit).unwrap();
        assert_eq!(classified.transition, Transition::Exit);
        assert_eq!(classified.component, "[OCN] RunPhase1");
    }

    #[test]
    fn test_classify_named_transitions_and_others() {
        let mut resolver = RegionResolver::new();

        let enter = RawMessage::event("phase_run_enter", 5, json!({}));
        let classified = resolver.classify(0, &enter).unwrap();
        assert_eq!(classified.component, "phase_run");

        let other = RawMessage::event("comm_send", 6, json!({}));
        assert!(resolver.classify(0, &other).is_none());
    }

    #[test]
    fn test_classify_drops_untimed_events() {
        let mut resolver = RegionResolver::new();
        let mut msg = RawMessage::event("x_enter", 0, json!({}));
        msg.timestamp_ns = None;
        assert!(resolver.classify(0, &msg).is_none());
    }

    #[test]
    fn test_unknown_region_gets_placeholder() {
        let mut resolver = RegionResolver::new();
        let enter = RawMessage::event("regionid_enter", 1, json!({"regionid": 42}));
        assert_eq!(resolver.classify(5, &enter).unwrap().component, "region_42");
    }
}
