//! Reconciliation between persisted records and live provider state.

use tracing::{debug, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::ClusterRecord;
use crate::store::KeyValueStore;

/// Identity fields that must agree between a persisted record and its live
/// counterpart. Returns the names of those that differ.
///
/// A creation time the provider had not reported when the record was written
/// may appear later; only a changed time counts.
#[must_use]
pub fn drifted_fields(persisted: &ClusterRecord, live: &ClusterRecord) -> Vec<&'static str> {
    let checks: [(&'static str, bool); 7] = [
        ("id", persisted.id == live.id),
        ("name", persisted.name == live.name),
        ("connectionName", persisted.connection_name == live.connection_name),
        ("description", persisted.description == live.description),
        ("cspClusterId", persisted.csp_cluster_id == live.csp_cluster_id),
        ("cspClusterName", persisted.csp_cluster_name == live.csp_cluster_name),
        (
            "createdTime",
            persisted.created_time.is_none() || persisted.created_time == live.created_time,
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(field, same)| (!same).then_some(field))
        .collect()
}

/// Fail when the live record drifted from the persisted one.
///
/// # Errors
/// Returns [`OrchestratorError::DriftDetected`] listing every differing field.
pub fn ensure_no_drift(
    namespace: &str,
    persisted: &ClusterRecord,
    live: &ClusterRecord,
) -> OrchestratorResult<()> {
    let fields = drifted_fields(persisted, live);
    if fields.is_empty() {
        return Ok(());
    }

    warn!(
        namespace = %namespace,
        cluster = %persisted.id,
        fields = ?fields,
        "Live cluster drifted from persisted record"
    );
    Err(OrchestratorError::DriftDetected {
        namespace: namespace.to_string(),
        cluster: persisted.id.clone(),
        fields,
    })
}

/// Outcome of re-reading a key right after writing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteVerification {
    /// The stored record equals what was written.
    Confirmed,
    /// Something else is stored now, usually a later writer.
    Mismatch,
    /// The re-read failed or the key is gone.
    Unavailable(String),
}

/// Re-read `key` and compare against `expected`.
///
/// Only logs; the caller keeps returning the record it computed.
pub async fn verify_write(
    store: &dyn KeyValueStore,
    key: &str,
    expected: &ClusterRecord,
) -> WriteVerification {
    let outcome = match store.get(key).await {
        Ok(Some(entry)) => match serde_json::from_str::<ClusterRecord>(&entry.value) {
            Ok(stored) if &stored == expected => WriteVerification::Confirmed,
            Ok(_) => WriteVerification::Mismatch,
            Err(e) => WriteVerification::Unavailable(e.to_string()),
        },
        Ok(None) => WriteVerification::Unavailable("key missing after write".to_string()),
        Err(e) => WriteVerification::Unavailable(e.to_string()),
    };

    match &outcome {
        WriteVerification::Confirmed => debug!(key = %key, "Write verified"),
        WriteVerification::Mismatch => {
            warn!(key = %key, "Stored record differs from the one just written");
        }
        WriteVerification::Unavailable(reason) => {
            warn!(key = %key, reason = %reason, "Could not verify write");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn record() -> ClusterRecord {
        ClusterRecord {
            id: "c1".to_string(),
            name: "c1".to_string(),
            connection_name: "aws-conn".to_string(),
            csp_cluster_id: "arn:c1".to_string(),
            csp_cluster_name: "c1".to_string(),
            created_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single(),
            ..ClusterRecord::default()
        }
    }

    #[test]
    fn test_status_and_version_changes_are_not_drift() {
        let live = ClusterRecord {
            version: "1.31".to_string(),
            status: crate::model::ClusterStatus::Updating,
            ..record()
        };
        assert!(drifted_fields(&record(), &live).is_empty());
        assert!(ensure_no_drift("ns1", &record(), &live).is_ok());
    }

    #[test]
    fn test_late_created_time_is_not_drift() {
        let persisted = ClusterRecord {
            created_time: None,
            ..record()
        };
        assert!(drifted_fields(&persisted, &record()).is_empty());

        let moved = ClusterRecord {
            created_time: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single(),
            ..record()
        };
        assert_eq!(drifted_fields(&record(), &moved), vec!["createdTime"]);
    }

    #[test]
    fn test_remote_rename_is_drift() {
        let live = ClusterRecord {
            id: "c1-renamed".to_string(),
            csp_cluster_name: "c1-renamed".to_string(),
            ..record()
        };

        assert_eq!(drifted_fields(&record(), &live), vec!["id", "cspClusterName"]);
        let err = ensure_no_drift("ns1", &record(), &live).unwrap_err();
        assert!(matches!(err, OrchestratorError::DriftDetected { fields, .. } if fields.len() == 2));
    }

    #[tokio::test]
    async fn test_verify_write_outcomes() {
        let store = MemoryStore::new();
        let key = "/ns/ns1/cluster/c1";

        assert!(matches!(
            verify_write(&store, key, &record()).await,
            WriteVerification::Unavailable(_)
        ));

        store
            .put(key, &serde_json::to_string(&record()).unwrap())
            .await
            .unwrap();
        assert_eq!(verify_write(&store, key, &record()).await, WriteVerification::Confirmed);

        let other = ClusterRecord {
            version: "1.31".to_string(),
            ..record()
        };
        assert_eq!(verify_write(&store, key, &other).await, WriteVerification::Mismatch);
    }
}
