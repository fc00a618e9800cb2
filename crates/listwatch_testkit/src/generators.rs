//! Property-based test generators using proptest.
//!
//! Provides strategies for generating resources and List stream scripts,
//! plus the reference model a List result is checked against.

use listwatch_protocol::{Resource, ResourceKey, ResourceVersion, Vpc, VpcPhase, WatchResponse};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating account ids.
///
/// Draws from a small pool so that generated keys collide often.
pub fn account_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["111111111111", "222222222222", "333333333333"])
        .prop_map(str::to_string)
}

/// Strategy for generating resource names from a small pool.
pub fn name_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|i| format!("vpc{i}"))
}

/// Strategy for generating resource keys.
pub fn key_strategy() -> impl Strategy<Value = ResourceKey> {
    (account_strategy(), name_strategy()).prop_map(|(account, name)| ResourceKey::new(account, name))
}

/// Strategy for generating VPC phases.
pub fn phase_strategy() -> impl Strategy<Value = VpcPhase> {
    prop_oneof![
        Just(VpcPhase::Provisioning),
        Just(VpcPhase::Ready),
        Just(VpcPhase::Failed),
        Just(VpcPhase::Deleting),
    ]
}

/// Strategy for generating VPCs with arbitrary specs.
pub fn vpc_strategy() -> impl Strategy<Value = Vpc> {
    (key_strategy(), 0u8..=255, phase_strategy()).prop_map(|(key, octet, phase)| {
        let mut vpc = Vpc::new(key.account_id, key.name).with_cidr_block(format!("10.{octet}.0.0/16"));
        vpc.status.phase = phase;
        vpc
    })
}

/// One non-bookmark delta in a generated List stream.
#[derive(Debug, Clone)]
pub enum ListScriptOp {
    /// `Added` or `Updated` snapshot.
    Upsert {
        /// Snapshot delivered.
        object: Vpc,
        /// Deliver as `Updated` instead of `Added`.
        as_update: bool,
    },
    /// `Deleted` delta.
    Delete(ResourceKey),
}

/// Strategy for generating the body of a List stream.
pub fn list_script_strategy() -> impl Strategy<Value = Vec<ListScriptOp>> {
    let op = prop_oneof![
        4 => (vpc_strategy(), any::<bool>())
            .prop_map(|(object, as_update)| ListScriptOp::Upsert { object, as_update }),
        1 => key_strategy().prop_map(ListScriptOp::Delete),
    ];
    prop::collection::vec(op, 0..40)
}

/// Renders a script as wire deltas followed by a bookmark at `version`.
///
/// Objects are versioned by their position in the script.
pub fn script_responses(script: &[ListScriptOp], version: &ResourceVersion) -> Vec<WatchResponse<Vpc>> {
    let mut responses: Vec<_> = versioned(script)
        .into_iter()
        .map(|(op, op_version)| match op {
            ListScriptOp::Upsert { object, as_update } => {
                let object = object.with_resource_version(op_version);
                if as_update {
                    WatchResponse::updated(object)
                } else {
                    WatchResponse::added(object)
                }
            }
            ListScriptOp::Delete(key) => WatchResponse::deleted(key, op_version),
        })
        .collect();
    responses.push(WatchResponse::bookmark(version.clone()));
    responses
}

/// Returns the snapshot a List of `script` must produce: the last write per
/// key, deleted keys removed, ordered by key.
pub fn expected_snapshot(script: &[ListScriptOp]) -> Vec<Vpc> {
    let mut model = BTreeMap::new();
    for (op, op_version) in versioned(script) {
        match op {
            ListScriptOp::Upsert { object, .. } => {
                let object = object.with_resource_version(op_version);
                model.insert(object.key(), object);
            }
            ListScriptOp::Delete(key) => {
                model.remove(&key);
            }
        }
    }
    model.into_values().collect()
}

fn versioned(script: &[ListScriptOp]) -> Vec<(ListScriptOp, ResourceVersion)> {
    script
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, op)| (op, ResourceVersion::from_sequence(i as u64 + 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn script_ends_with_bookmark(script in list_script_strategy()) {
            let version = ResourceVersion::from_sequence(1000);
            let responses = script_responses(&script, &version);
            prop_assert_eq!(responses.len(), script.len() + 1);
            prop_assert!(responses.last().map_or(false, |r| r.is_bookmark()));
        }

        #[test]
        fn expected_snapshot_has_unique_sorted_keys(script in list_script_strategy()) {
            let snapshot = expected_snapshot(&script);
            let keys: Vec<_> = snapshot.iter().map(Resource::key).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(keys, sorted);
        }
    }

    #[test]
    fn delete_removes_earlier_write() {
        let key = ResourceKey::new("111111111111", "vpc1");
        let script = vec![
            ListScriptOp::Upsert {
                object: Vpc::new("111111111111", "vpc1"),
                as_update: false,
            },
            ListScriptOp::Delete(key),
        ];
        assert!(expected_snapshot(&script).is_empty());
    }
}
