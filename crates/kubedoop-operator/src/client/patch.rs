//! Structural comparison of a live object with the desired state.
//!
//! The API server adds a lot to every object: metadata it manages itself, a status, and defaults
//! for every field the operator left out. None of that must count as a difference, otherwise
//! every reconciliation would write every object.
//!
//! The comparison therefore works on a projection of the live object. Only fields which are
//! present in the desired object, or which were present the last time the operator wrote the
//! object (recorded in [`LAST_APPLIED_CONFIGURATION_KEY`]), are kept. Fields the server defaulted
//! are dropped, fields the operator stopped setting are kept and show up as removals. Resource
//! quantities the server rewrote into their canonical form count as unchanged, and so do empty
//! lists and maps the server did not store.
use json_patch::Patch;
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};

use crate::{kvp::consts::LAST_APPLIED_CONFIGURATION_KEY, quantity::same_quantity};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the last applied configuration annotation"))]
    ParseLastApplied { source: serde_json::Error },
}

/// Keys whose values, at any depth, are resource quantities.
const QUANTITY_KEYS: &[&str] = &["limits", "requests", "sizeLimit"];

/// Metadata fields owned by the API server.
const SERVER_MANAGED_METADATA: &[&str] = &[
    "creationTimestamp",
    "deletionGracePeriodSeconds",
    "deletionTimestamp",
    "generation",
    "managedFields",
    "resourceVersion",
    "selfLink",
    "uid",
];

/// Returns the operations turning `live` into `desired`. An empty patch means nothing changed.
///
/// `ignored_pointers` are JSON pointers removed from both sides before comparing, e.g. fields
/// that are immutable after creation.
pub fn calculate_patch(live: &Value, desired: &Value, ignored_pointers: &[String]) -> Result<Patch> {
    let last_applied = last_applied_configuration(live)?;

    let mut live = strip_server_fields(live.clone());
    let mut desired = strip_server_fields(desired.clone());
    let mut last_applied = last_applied.map(strip_server_fields);
    prune_empty(&mut live);
    prune_empty(&mut desired);
    if let Some(last_applied) = last_applied.as_mut() {
        prune_empty(last_applied);
    }
    for pointer in ignored_pointers {
        remove_pointer(&mut live, pointer);
        remove_pointer(&mut desired, pointer);
        if let Some(last_applied) = last_applied.as_mut() {
            remove_pointer(last_applied, pointer);
        }
    }

    let projected = project(&live, &desired, last_applied.as_ref(), false);
    Ok(json_patch::diff(&projected, &desired))
}

/// Reads the state the operator wrote last time from the annotation of `live`.
fn last_applied_configuration(live: &Value) -> Result<Option<Value>> {
    live.pointer("/metadata/annotations")
        .and_then(|annotations| annotations.get(LAST_APPLIED_CONFIGURATION_KEY))
        .and_then(Value::as_str)
        .map(|raw| serde_json::from_str(raw).context(ParseLastAppliedSnafu))
        .transpose()
}

/// Removes the status, server managed metadata and the last applied annotation.
pub fn strip_server_fields(mut object: Value) -> Value {
    if let Some(root) = object.as_object_mut() {
        root.remove("status");
        if let Some(metadata) = root.get_mut("metadata").and_then(Value::as_object_mut) {
            for field in SERVER_MANAGED_METADATA {
                metadata.remove(*field);
            }
            let annotations_empty = metadata
                .get_mut("annotations")
                .and_then(Value::as_object_mut)
                .map(|annotations| {
                    annotations.remove(LAST_APPLIED_CONFIGURATION_KEY);
                    annotations.is_empty()
                });
            if annotations_empty == Some(true) {
                metadata.remove("annotations");
            }
        }
    }
    object
}

/// Drops nulls, empty arrays and empty objects from every object. The API server omits them
/// when it stores an object.
fn prune_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.values_mut().for_each(prune_empty);
            map.retain(|_, value| match value {
                Value::Null => false,
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
                _ => true,
            });
        }
        Value::Array(items) => items.iter_mut().for_each(prune_empty),
        _ => {}
    }
}

/// Removes the value at `pointer`. A `*` segment matches every element of an array.
fn remove_pointer(value: &mut Value, pointer: &str) {
    let segments = pointer
        .trim_start_matches('/')
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>();
    remove_segments(value, &segments);
}

fn remove_segments(value: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    match value {
        Value::Object(map) if rest.is_empty() => {
            map.remove(first);
        }
        Value::Object(map) => {
            if let Some(child) = map.get_mut(first) {
                remove_segments(child, rest);
            }
        }
        Value::Array(items) if first == "*" => {
            if rest.is_empty() {
                items.clear();
            } else {
                for item in items {
                    remove_segments(item, rest);
                }
            }
        }
        _ => {}
    }
}

/// Keeps the parts of `live` which the operator owns, see the module documentation.
///
/// `quantities` is set below keys holding resource quantities.
fn project(live: &Value, desired: &Value, last_applied: Option<&Value>, quantities: bool) -> Value {
    match (live, desired) {
        (Value::Object(live_map), Value::Object(desired_map)) => {
            let last_applied_map = last_applied.and_then(Value::as_object);
            let projected = live_map
                .iter()
                .filter_map(|(key, live_value)| {
                    let desired_value = desired_map.get(key);
                    let last_applied_value = last_applied_map.and_then(|map| map.get(key));
                    match (desired_value, last_applied_value) {
                        (Some(desired_value), _) => Some((
                            key.clone(),
                            project(
                                live_value,
                                desired_value,
                                last_applied_value,
                                quantities || QUANTITY_KEYS.contains(&key.as_str()),
                            ),
                        )),
                        // Owned before but not anymore, keep it so it is removed
                        (None, Some(_)) => Some((key.clone(), live_value.clone())),
                        // Defaulted by the server
                        (None, None) => None,
                    }
                })
                .collect::<Map<_, _>>();
            Value::Object(projected)
        }
        (Value::Array(live_items), Value::Array(desired_items))
            if live_items.len() == desired_items.len() =>
        {
            let last_applied_items = last_applied
                .and_then(Value::as_array)
                .filter(|items| items.len() == desired_items.len());
            Value::Array(
                live_items
                    .iter()
                    .zip(desired_items)
                    .enumerate()
                    .map(|(index, (live_item, desired_item))| {
                        let last_applied_item =
                            last_applied_items.and_then(|items| items.get(index));
                        project(live_item, desired_item, last_applied_item, quantities)
                    })
                    .collect(),
            )
        }
        (Value::String(live_quantity), Value::String(desired_quantity))
            if quantities && same_quantity(live_quantity, desired_quantity) =>
        {
            desired.clone()
        }
        _ => live.clone(),
    }
}
