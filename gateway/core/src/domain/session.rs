// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Session record: continuity context for stateful agents.
//!
//! A session belongs to one agent for its whole lifetime. Its `context` is an
//! opaque JSON value merged by each completed run that references it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub agent_name: String,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(agent_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            agent_name: agent_name.into(),
            context: Value::Object(Map::new()),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, inactivity: Duration) -> bool {
        now - self.last_activity_at > inactivity
    }

    /// Object updates merge key by key (a `null` value removes the key);
    /// any other update replaces the context wholesale.
    pub fn merge_context(&mut self, update: Value) {
        match (&mut self.context, update) {
            (Value::Object(current), Value::Object(changes)) => {
                for (key, value) in changes {
                    if value.is_null() {
                        current.remove(&key);
                    } else {
                        current.insert(key, value);
                    }
                }
            }
            (_, replacement) => self.context = replacement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_objects_key_by_key() {
        let mut s = SessionRecord::new("echo");
        s.merge_context(json!({"turns": 1, "topic": "weather"}));
        s.merge_context(json!({"turns": 2, "topic": null, "lang": "en"}));
        assert_eq!(s.context, json!({"turns": 2, "lang": "en"}));
    }

    #[test]
    fn non_object_update_replaces() {
        let mut s = SessionRecord::new("echo");
        s.merge_context(json!({"a": 1}));
        s.merge_context(json!(["history"]));
        assert_eq!(s.context, json!(["history"]));
        s.merge_context(json!({"b": 2}));
        assert_eq!(s.context, json!({"b": 2}));
    }

    #[test]
    fn expiry_uses_last_activity() {
        let mut s = SessionRecord::new("echo");
        let later = s.created_at + Duration::minutes(10);
        assert!(s.is_expired(later, Duration::minutes(5)));

        s.touch(later);
        assert!(!s.is_expired(later + Duration::minutes(1), Duration::minutes(5)));
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut s = SessionRecord::new("echo");
        let before = s.last_activity_at;
        s.touch(before - Duration::hours(1));
        assert_eq!(s.last_activity_at, before);
    }
}
