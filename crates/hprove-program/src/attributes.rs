//! Declaration attributes, `{:key value}` style.

use indexmap::IndexMap;

/// Attribute keys the inference engine interprets.
pub mod keys {
    /// Marks a boolean constant as a candidate whose value is inferred.
    pub const EXISTENTIAL: &str = "existential";
    /// Forces a candidate to `current_stage == N` during staged checks.
    pub const STAGE_ACTIVE: &str = "stage_active";
    /// Forces a candidate to `N in completed_stages` during staged checks.
    pub const STAGE_COMPLETE: &str = "stage_complete";
    /// Labels an assume command as a capture state for model projection.
    pub const CAPTURE_STATE: &str = "captureState";
    /// Marks an ensures clause rewritten for inlining.
    pub const INLINE_ASSUME: &str = "inline_assume";
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    String(String),
}

/// An ordered attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: IndexMap<String, Vec<AttrValue>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.entries.insert(key.into(), vec![value]);
    }

    pub fn set_flag(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), Vec::new());
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.shift_remove(key);
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key)?.first()? {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)?.first()? {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)?.first()? {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Builder-style helpers for test programs.
    pub fn with(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.set(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let mut attrs = Attributes::new();
        attrs.set(keys::EXISTENTIAL, AttrValue::Bool(true));
        attrs.set(keys::STAGE_ACTIVE, AttrValue::Int(2));
        attrs.set(keys::CAPTURE_STATE, AttrValue::String("loop_head".into()));

        assert_eq!(attrs.get_bool(keys::EXISTENTIAL), Some(true));
        assert_eq!(attrs.get_int(keys::STAGE_ACTIVE), Some(2));
        assert_eq!(attrs.get_str(keys::CAPTURE_STATE), Some("loop_head"));
        assert_eq!(attrs.get_bool(keys::STAGE_ACTIVE), None);
    }

    #[test]
    fn flags_and_removal() {
        let mut attrs = Attributes::new();
        attrs.set_flag(keys::INLINE_ASSUME);
        assert!(attrs.has(keys::INLINE_ASSUME));
        attrs.remove(keys::INLINE_ASSUME);
        assert!(!attrs.has(keys::INLINE_ASSUME));
    }
}
