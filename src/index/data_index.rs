use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::Value;
use crate::core::utils::{get_path, stringify};

/// Joins per-field values into a composite key. Field values that contain
/// the delimiter can collide with other combinations.
pub const KEY_DELIMITER: &str = "|";

/// Token written for a missing field in a non-sparse index.
pub const NULL_TOKEN: &str = "null";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub unique: bool,  // metadata only, never enforced
    pub sparse: bool,
}

impl IndexOptions {
    pub fn sparse() -> Self {
        IndexOptions { unique: false, sparse: true }
    }
}

/// Serialized form of an index, as carried in export payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
    pub data: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub name: String,
    pub fields: Vec<String>,
    pub buckets: usize,
    pub entries: usize,
    pub empty_buckets: usize,
}

/// Inverted index over one store: composite key -> record keys.
///
/// There is no reverse map, so `remove` scans every bucket (O(buckets)).
#[derive(Debug, Clone)]
pub struct DataIndex {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
    buckets: BTreeMap<String, BTreeSet<String>>,
}

impl DataIndex {
    pub fn new(name: &str, fields: Vec<String>, options: IndexOptions) -> Result<Self> {
        if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::invalid_input(format!(
                "index '{}' needs at least one non-empty field",
                name
            )));
        }

        Ok(DataIndex {
            name: name.to_string(),
            fields,
            unique: options.unique,
            sparse: options.sparse,
            buckets: BTreeMap::new(),
        })
    }

    /// Composite key for a record, or `None` when a sparse index skips it.
    pub fn composite_key(&self, value: &Value) -> Option<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match get_path(value, field) {
                Some(v) if !v.is_null() => parts.push(stringify(v)),
                _ if self.sparse => return None,
                _ => parts.push(NULL_TOKEN.to_string()),
            }
        }
        Some(parts.join(KEY_DELIMITER))
    }

    /// Composite key for a lookup probe. Objects go through field
    /// extraction; a scalar on a single-field index, or an array with one
    /// element per field, is taken as the field value(s) directly.
    pub fn probe_key(&self, probe: &Value) -> Option<String> {
        match probe {
            Value::Object(_) => self.composite_key(probe),
            Value::Array(items) if self.fields.len() > 1 => self.values_key(items),
            Value::Null if self.sparse => None,
            Value::Null if self.fields.len() == 1 => Some(NULL_TOKEN.to_string()),
            scalar if self.fields.len() == 1 => Some(stringify(scalar)),
            _ => None,
        }
    }

    /// Composite key from already-extracted field values, one per field in
    /// declaration order.
    pub fn values_key(&self, values: &[Value]) -> Option<String> {
        if values.len() != self.fields.len() {
            return None;
        }
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            if value.is_null() {
                if self.sparse {
                    return None;
                }
                parts.push(NULL_TOKEN.to_string());
            } else {
                parts.push(stringify(value));
            }
        }
        Some(parts.join(KEY_DELIMITER))
    }

    pub fn add(&mut self, key: &str, value: &Value) {
        if let Some(composite) = self.composite_key(value) {
            self.buckets
                .entry(composite)
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Remove `key` from every bucket. Empty buckets are left in place until
    /// `optimize`.
    pub fn remove(&mut self, key: &str) -> bool {
        let mut removed = false;
        for bucket in self.buckets.values_mut() {
            removed |= bucket.remove(key);
        }
        removed
    }

    pub fn update(&mut self, key: &str, _old: Option<&Value>, new: &Value) {
        self.remove(key);
        self.add(key, new);
    }

    /// Look up by probe (see `probe_key`). An object probe is always read as
    /// a whole record, so a field that itself holds an object or array has
    /// to be looked up with `find_values`.
    pub fn find(&self, probe: &Value) -> BTreeSet<String> {
        self.probe_key(probe)
            .map(|k| self.find_key(&k))
            .unwrap_or_default()
    }

    /// Look up by field values without any extraction.
    pub fn find_values(&self, values: &[Value]) -> BTreeSet<String> {
        self.values_key(values)
            .map(|k| self.find_key(&k))
            .unwrap_or_default()
    }

    pub fn find_key(&self, composite: &str) -> BTreeSet<String> {
        self.buckets.get(composite).cloned().unwrap_or_default()
    }

    pub fn contains(&self, composite: &str, key: &str) -> bool {
        self.buckets.get(composite).is_some_and(|keys| keys.contains(key))
    }

    pub fn bucket_len(&self, composite: &str) -> usize {
        self.buckets.get(composite).map(BTreeSet::len).unwrap_or(0)
    }

    /// Drop empty buckets. Returns how many were removed.
    pub fn optimize(&mut self) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, keys| !keys.is_empty());
        before - self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.buckets.iter()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.name.clone(),
            fields: self.fields.clone(),
            buckets: self.buckets.len(),
            entries: self.entry_count(),
            empty_buckets: self.buckets.values().filter(|b| b.is_empty()).count(),
        }
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            name: self.name.clone(),
            fields: self.fields.clone(),
            unique: self.unique,
            sparse: self.sparse,
            data: self
                .buckets
                .iter()
                .map(|(k, keys)| (k.clone(), keys.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Rebuild from a snapshot, taking bucket contents verbatim.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        let mut index = DataIndex::new(
            &snapshot.name,
            snapshot.fields,
            IndexOptions { unique: snapshot.unique, sparse: snapshot.sparse },
        )?;
        for (composite, keys) in snapshot.data {
            index.buckets.insert(composite, keys.into_iter().collect());
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rank_index() -> DataIndex {
        DataIndex::new("by_rank", vec!["rank".into()], IndexOptions::default()).unwrap()
    }

    #[test]
    fn scalar_probe_on_single_field() {
        let mut index = rank_index();
        index.add("p1", &json!({"id": 1, "rank": "gold"}));
        index.add("p2", &json!({"id": 2, "rank": "silver"}));

        assert_eq!(index.find(&json!("gold")), BTreeSet::from(["p1".to_string()]));
        assert_eq!(index.find(&json!({"rank": "silver"})).len(), 1);
        assert!(index.find(&json!("bronze")).is_empty());
    }

    #[test]
    fn missing_field_becomes_null_token() {
        let mut index = rank_index();
        index.add("p3", &json!({"id": 3}));
        assert_eq!(index.find_key("null").len(), 1);
        assert_eq!(index.find(&Value::Null).len(), 1);
    }

    #[test]
    fn sparse_index_skips_missing() {
        let mut index = DataIndex::new("r", vec!["rank".into()], IndexOptions::sparse()).unwrap();
        index.add("p3", &json!({"id": 3}));
        index.add("p4", &json!({"rank": null}));
        assert_eq!(index.entry_count(), 0);
    }

    #[test]
    fn composite_keys_join_fields() {
        let mut index = DataIndex::new(
            "rank_level",
            vec!["rank".into(), "stats.level".into()],
            IndexOptions::default(),
        )
        .unwrap();
        index.add("p1", &json!({"rank": "gold", "stats": {"level": 7}}));

        assert_eq!(index.find_key("gold|7").len(), 1);
        assert_eq!(index.find(&json!(["gold", 7])).len(), 1);
        assert!(index.find(&json!("gold")).is_empty());
    }

    #[test]
    fn delimiter_collision_is_possible() {
        let mut index = DataIndex::new("ab", vec!["a".into(), "b".into()], IndexOptions::default()).unwrap();
        index.add("x", &json!({"a": "1|2", "b": "3"}));
        index.add("y", &json!({"a": "1", "b": "2|3"}));
        assert_eq!(index.find_key("1|2|3").len(), 2);
    }

    #[test]
    fn remove_and_optimize() {
        let mut index = rank_index();
        index.add("p1", &json!({"rank": "gold"}));
        index.update("p1", None, &json!({"rank": "silver"}));

        assert!(index.find(&json!("gold")).is_empty());
        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.optimize(), 1);
        assert_eq!(index.bucket_count(), 1);
        assert!(!index.remove("nobody"));
    }

    #[test]
    fn snapshot_restores_verbatim() {
        let mut index = rank_index();
        index.add("p1", &json!({"rank": "gold"}));
        let mut snapshot = index.snapshot();
        snapshot.data.insert("platinum".into(), vec!["ghost".into()]);

        let restored = DataIndex::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.find_key("platinum").len(), 1);
        assert_eq!(restored.find(&json!("gold")).len(), 1);
    }

    #[test]
    fn rejects_empty_fields() {
        assert!(DataIndex::new("bad", vec![], IndexOptions::default()).is_err());
    }

    #[test]
    fn object_field_values_need_find_values() {
        let mut index = DataIndex::new("by_pos", vec!["pos".into()], IndexOptions::default()).unwrap();
        let record = json!({"pos": {"x": 1, "y": 2}});
        index.add("p1", &record);

        let field = json!({"x": 1, "y": 2});
        assert!(index.find(&field).is_empty());
        assert_eq!(index.find(&record).len(), 1);
        assert_eq!(
            index.find_values(&[field]).into_iter().collect::<Vec<_>>(),
            vec!["p1".to_string()]
        );
        assert!(index.find_values(&[]).is_empty());

        let composite = index.composite_key(&record).unwrap();
        assert!(index.contains(&composite, "p1"));
        assert!(!index.contains(&composite, "p2"));
    }
}
