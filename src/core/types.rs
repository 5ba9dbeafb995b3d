use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind};

/// Record payload. A closed variant set (null, bool, number, string, array,
/// object); absence is modelled with `Option`, never with `Value::Null`.
pub type Value = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriptionId {
    fn from(id: u64) -> Self {
        SubscriptionId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Backing medium of a store. Only `Memory` is implemented by the core;
/// the others are accepted in configuration so that durable backends can
/// be plugged in without changing the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    Memory,
    Local,
    Session,
    Indexed,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Memory => "memory",
            StoreType::Local => "local",
            StoreType::Session => "session",
            StoreType::Indexed => "indexed",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, StoreType::Memory)
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "local" | "localstorage" => Ok(StoreType::Local),
            "session" | "sessionstorage" => Ok(StoreType::Session),
            "indexed" | "indexeddb" => Ok(StoreType::Indexed),
            other => Err(Error::new(
                ErrorKind::UnsupportedStoreType,
                format!("unknown store type '{}'", other),
            )),
        }
    }
}

/// A stored value plus its first-insertion sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub value: Value,
    pub seq: u64,
}

impl Record {
    pub fn new(value: Value, seq: u64) -> Self {
        Record { value, seq }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_type_parses_aliases() {
        assert_eq!("Memory".parse::<StoreType>().unwrap(), StoreType::Memory);
        assert_eq!("indexedDB".parse::<StoreType>().unwrap(), StoreType::Indexed);
        let err = "floppy".parse::<StoreType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedStoreType);
    }

    #[test]
    fn only_memory_is_supported() {
        assert!(StoreType::Memory.is_supported());
        assert!(!StoreType::Local.is_supported());
        assert_eq!(serde_json::to_string(&StoreType::Session).unwrap(), "\"session\"");
    }
}
