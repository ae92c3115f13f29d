//! Persisted-state blob codec.
//!
//! A snapshot travels as JSON: a format version, the SHA-256 digest of the
//! declarative spec the network was built from, and one record per
//! component keyed by name. Decoding validates the version and, when a
//! network is supplied, the digest; a blob taken from a different spec is
//! rejected before any state is touched.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use aeps_core::state::SystemSnapshot;
use aeps_core::{ElecError, ElecResult, Network};

/// Current blob format version.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotBlob {
    version: u32,
    #[serde(flatten)]
    snapshot: SystemSnapshot,
}

/// Encode a snapshot into its portable JSON form.
pub fn encode_snapshot(snapshot: &SystemSnapshot) -> ElecResult<String> {
    let blob = SnapshotBlob {
        version: FORMAT_VERSION,
        snapshot: snapshot.clone(),
    };
    serde_json::to_string_pretty(&blob)
        .map_err(|e| ElecError::Snapshot(format!("encoding snapshot: {}", e)))
}

/// Decode a snapshot blob, checking the format version and (when given a
/// network) that the blob's spec digest matches the network's.
pub fn decode_snapshot(json: &str, network: Option<&Network>) -> ElecResult<SystemSnapshot> {
    let blob: SnapshotBlob = serde_json::from_str(json)
        .map_err(|e| ElecError::Snapshot(format!("decoding snapshot: {}", e)))?;
    if blob.version != FORMAT_VERSION {
        return Err(ElecError::Snapshot(format!(
            "unsupported snapshot version {} (expected {})",
            blob.version, FORMAT_VERSION
        )));
    }
    if let Some(network) = network {
        match (network.spec_digest(), blob.snapshot.spec_digest.as_deref()) {
            (Some(ours), Some(theirs)) if ours != theirs => {
                return Err(ElecError::Snapshot(
                    "snapshot digest does not match the network spec".into(),
                ));
            }
            _ => {}
        }
    }
    Ok(blob.snapshot)
}

/// Write a snapshot blob to a file.
pub fn write_snapshot_file(path: &Path, snapshot: &SystemSnapshot) -> ElecResult<()> {
    let json = encode_snapshot(snapshot)?;
    fs::write(path, json).map_err(ElecError::Io)
}

/// Read a snapshot blob from a file, validating against `network`.
pub fn read_snapshot_file(path: &Path, network: Option<&Network>) -> ElecResult<SystemSnapshot> {
    let json = fs::read_to_string(path).map_err(ElecError::Io)?;
    decode_snapshot(&json, network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeps_core::state::{CompRecord, KindRecord};
    use std::collections::BTreeMap;

    fn sample_snapshot(digest: Option<&str>) -> SystemSnapshot {
        let mut comps = BTreeMap::new();
        comps.insert(
            "MAIN_BATT".to_string(),
            CompRecord {
                failed: false,
                shorted: false,
                kind: KindRecord::Batt {
                    charge: 0.82,
                    temp_c: 15.0,
                    rechg_w: 0.0,
                },
            },
        );
        comps.insert(
            "BUS_TIE".to_string(),
            CompRecord {
                failed: false,
                shorted: false,
                kind: KindRecord::Tie {
                    tied: vec![true, false],
                },
            },
        );
        SystemSnapshot {
            spec_digest: digest.map(str::to_string),
            comps,
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let snap = sample_snapshot(Some("abc123"));
        let json = encode_snapshot(&snap).unwrap();
        let back = decode_snapshot(&json, None).unwrap();
        assert_eq!(snap, back);
    }

    #[test]
    fn test_version_check() {
        let snap = sample_snapshot(None);
        let json = encode_snapshot(&snap).unwrap();
        let bad = json.replace("\"version\": 1", "\"version\": 99");
        let err = decode_snapshot(&bad, None).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let snap = sample_snapshot(Some("abc123"));
        write_snapshot_file(&path, &snap).unwrap();
        let back = read_snapshot_file(&path, None).unwrap();
        assert_eq!(snap, back);
    }
}
