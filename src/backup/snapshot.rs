use std::collections::BTreeMap;

use semver::Version;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::collections::CollectionName;
use crate::error::{BACKUP_INVALID_FORMAT, BACKUP_UNSUPPORTED_VERSION};
use crate::store::json_kind;
use crate::AppError;

pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Every collection, captured together, in one portable document.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupSnapshot {
    pub version: Version,
    pub created_at: String,
    /// Only the collections the document carried. Ordered by enumeration.
    pub collections: BTreeMap<CollectionName, Vec<Value>>,
}

impl BackupSnapshot {
    pub fn collection(&self, name: CollectionName) -> Option<&[Value]> {
        self.collections.get(&name).map(Vec::as_slice)
    }

    pub fn counts(&self) -> BTreeMap<CollectionName, usize> {
        self.collections
            .iter()
            .map(|(name, records)| (*name, records.len()))
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// `version`, `createdAt`, then one array per collection in enumerated order.
impl Serialize for BackupSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.collections.len()))?;
        map.serialize_entry("version", &self.version.to_string())?;
        map.serialize_entry("createdAt", &self.created_at)?;
        for (name, records) in &self.collections {
            map.serialize_entry(name.as_str(), records)?;
        }
        map.end()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SnapshotError {
    #[error("backup file is not valid JSON: {source}")]
    NotJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("backup file must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("backup file has no version")]
    MissingVersion,
    #[error("backup version {raw} is not a valid version")]
    InvalidVersion { raw: String },
    #[error("backup version {found} is newer than supported {supported}")]
    Unsupported { found: Version, supported: Version },
    #[error("collection {collection} must be an array, found {found}")]
    NotAnArray {
        collection: CollectionName,
        found: &'static str,
    },
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        let message = err.to_string();
        match err {
            SnapshotError::Unsupported { found, supported } => {
                AppError::new(BACKUP_UNSUPPORTED_VERSION, message)
                    .with_context("version", found.to_string())
                    .with_context("supported", supported.to_string())
            }
            SnapshotError::NotAnArray { collection, .. } => {
                AppError::new(BACKUP_INVALID_FORMAT, message)
                    .with_context("collection", collection.as_str())
            }
            SnapshotError::NotJson { source } => {
                AppError::new(BACKUP_INVALID_FORMAT, message).with_cause(source)
            }
            _ => AppError::new(BACKUP_INVALID_FORMAT, message),
        }
    }
}

/// Version stamped on snapshots this build writes.
pub fn current_version() -> Version {
    Version::new(1, 0, 0)
}

/// Validate a backup document completely before anything is written.
pub fn parse_snapshot(bytes: &[u8]) -> Result<BackupSnapshot, AppError> {
    parse_inner(bytes).map_err(|err| {
        let err = AppError::from(err);
        tracing::warn!(
            target: "ironward",
            event = "snapshot_rejected",
            code = %err.code(),
            reason = %err.message()
        );
        err
    })
}

fn parse_inner(bytes: &[u8]) -> Result<BackupSnapshot, SnapshotError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|source| SnapshotError::NotJson { source })?;
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(SnapshotError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let version = read_version(&object)?;
    let created_at = object
        .remove("createdAt")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let mut collections = BTreeMap::new();
    for name in CollectionName::ALL {
        match object.remove(name.as_str()) {
            None => {}
            Some(Value::Array(items)) => {
                collections.insert(name, items);
            }
            Some(other) => {
                return Err(SnapshotError::NotAnArray {
                    collection: name,
                    found: json_kind(&other),
                })
            }
        }
    }

    let ignored: Vec<&String> = object.keys().filter(|k| k.as_str() != "version").collect();
    if !ignored.is_empty() {
        tracing::debug!(target: "ironward", event = "snapshot_unknown_keys", keys = ?ignored);
    }

    Ok(BackupSnapshot {
        version,
        created_at,
        collections,
    })
}

fn read_version(object: &Map<String, Value>) -> Result<Version, SnapshotError> {
    let raw = match object.get("version") {
        None | Some(Value::Null) => return Err(SnapshotError::MissingVersion),
        Some(Value::String(raw)) => raw.trim().to_string(),
        Some(other) => other.to_string(),
    };
    let version = Version::parse(&raw)
        .or_else(|_| Version::parse(&format!("{raw}.0")))
        .or_else(|_| Version::parse(&format!("{raw}.0.0")))
        .map_err(|_| SnapshotError::InvalidVersion { raw: raw.clone() })?;
    let supported = current_version();
    if version.major > supported.major {
        return Err(SnapshotError::Unsupported {
            found: version,
            supported,
        });
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_short_versions_and_partial_documents() {
        let snapshot =
            parse_snapshot(br#"{"version":"1.0","createdAt":"2024-01-01T00:00:00Z","wards":[]}"#)
                .expect("parse");
        assert_eq!(snapshot.version, current_version());
        assert_eq!(current_version().to_string(), SNAPSHOT_VERSION);
        assert_eq!(snapshot.collection(CollectionName::Wards), Some(&[][..]));
        assert!(snapshot.collection(CollectionName::Inmates).is_none());
    }

    #[test]
    fn rejects_structural_problems() {
        let cases = [
            ("not json", BACKUP_INVALID_FORMAT),
            ("[1,2]", BACKUP_INVALID_FORMAT),
            (r#"{"inmates":[]}"#, BACKUP_INVALID_FORMAT),
            (r#"{"version":"banana"}"#, BACKUP_INVALID_FORMAT),
            (r#"{"version":"2.0.0"}"#, BACKUP_UNSUPPORTED_VERSION),
            (r#"{"version":"1.0.0","inmates":{"id":"x"}}"#, BACKUP_INVALID_FORMAT),
        ];
        for (input, code) in cases {
            let err = parse_snapshot(input.as_bytes()).unwrap_err();
            assert_eq!(err.code(), code, "input {input}");
        }
    }

    #[test]
    fn serializes_collections_in_enumerated_order() {
        let mut collections = BTreeMap::new();
        collections.insert(CollectionName::Favorites, vec![json!({"id": "f"})]);
        collections.insert(CollectionName::Users, vec![]);
        collections.insert(CollectionName::Inmates, vec![json!({"id": "i"})]);
        let snapshot = BackupSnapshot {
            version: current_version(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            collections,
        };
        let text = String::from_utf8(snapshot.to_json_pretty().expect("encode")).expect("utf8");
        let positions: Vec<usize> = ["\"version\"", "\"createdAt\"", "\"users\"", "\"inmates\"", "\"favorites\""]
            .iter()
            .map(|key| text.find(key).expect("key present"))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);

        let reparsed = parse_snapshot(text.as_bytes()).expect("reparse");
        assert_eq!(reparsed, snapshot);
    }
}
