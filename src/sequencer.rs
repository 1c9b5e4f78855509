//! Execution order of a selected batch.
//!
//! Each request gets an [`OrderKey`] `(selection slot, tier, order within tier)`.
//! Variants and sub-scenarios share their parent's slot when the parent is selected,
//! so they run right after it. The result depends only on the selection and the
//! records, never on map iteration order.

use crate::model::{OrderKey, RequestType, RunRequest, Tier};
use crate::storage::{ScenarioRecord, StoredSpeedAssignmentInput, SubScenarioRecord, VARIANT_SLOT_PARAM};
use serde_json::Value;
use std::collections::HashSet;

pub const VARIANT_ID_PREFIX: &str = "stored_speed_assignment_";

/// Resolve the ordered list of requests for `selection` (ids in the user's order).
pub fn resolve_runnable_scenarios(
    selection: &[String],
    records: &[ScenarioRecord],
) -> Vec<RunRequest> {
    let slot_of = |id: &str| selection.iter().position(|s| s == id);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut requests = Vec::new();

    for record in records {
        let parent_slot = slot_of(&record.id);
        if let Some(slot) = parent_slot {
            if seen.insert(record.id.as_str()) {
                requests.push(parent_request(record, slot));
                let variants = record
                    .stored_speed_assignment_inputs
                    .iter()
                    .enumerate()
                    .filter_map(|(i, input)| input.as_ref().map(|input| (i, input)));
                for (order, (stored_slot, input)) in variants.enumerate() {
                    requests.push(variant_request(record, input, slot, order, stored_slot));
                }
            }
        }

        for sub in &record.sub_scenarios {
            let Some(sub_slot) = slot_of(&sub.id) else {
                continue;
            };
            if seen.insert(sub.id.as_str()) {
                let key = OrderKey {
                    primary: parent_slot.unwrap_or(sub_slot),
                    tier: Tier::SubScenario,
                    tier_order: sub_slot,
                };
                requests.push(sub_request(record, sub, key));
            }
        }
    }

    requests.sort_by_key(|r| r.order_key);
    requests
}

fn parent_request(record: &ScenarioRecord, slot: usize) -> RunRequest {
    RunRequest {
        id: record.id.clone(),
        name: record.name.clone(),
        request_type: record.request_type(),
        parent_id: None,
        order_key: OrderKey {
            primary: slot,
            tier: Tier::Parent,
            tier_order: 0,
        },
        params: record.params.clone(),
    }
}

fn variant_request(
    record: &ScenarioRecord,
    input: &StoredSpeedAssignmentInput,
    slot: usize,
    order: usize,
    stored_slot: usize,
) -> RunRequest {
    let mut params = record.params.clone();
    params.insert("first_scenario_id".into(), input.first_scenario_id.clone());
    params.insert(
        "submodel".into(),
        input.submodel.clone().map(Value::from).unwrap_or(Value::Null),
    );
    params.insert("stored_speed_assignment".into(), Value::from(false));
    params.insert(VARIANT_SLOT_PARAM.into(), Value::from(stored_slot));
    RunRequest {
        id: format!("{VARIANT_ID_PREFIX}{order}_{}", record.id),
        name: record.name.clone(),
        request_type: RequestType::StoredSpeedAssignmentVariant,
        parent_id: Some(record.id.clone()),
        order_key: OrderKey {
            primary: slot,
            tier: Tier::Variant,
            tier_order: order,
        },
        params,
    }
}

fn sub_request(record: &ScenarioRecord, sub: &SubScenarioRecord, key: OrderKey) -> RunRequest {
    let mut params = record.params.clone();
    if let Some(number) = &sub.emme_scenario_number {
        params.insert("first_scenario_id".into(), number.clone());
    }
    params.insert("end_assignment_only".into(), Value::from(true));
    if let Some(cost) = sub.cost_data_file.as_deref().filter(|c| !c.is_empty()) {
        params.insert("cost_data_file".into(), Value::from(cost));
    }
    params.insert("parent_scenario_name".into(), Value::from(record.name.clone()));
    RunRequest {
        id: sub.id.clone(),
        name: sub.name.clone(),
        request_type: record.request_type(),
        parent_id: Some(record.id.clone()),
        order_key: key,
        params,
    }
}

/// Immutable request list of a running batch plus its cursor.
#[derive(Debug, Clone)]
pub struct RunQueue {
    requests: Vec<RunRequest>,
    current: Option<usize>,
    next: usize,
}

impl RunQueue {
    pub fn new(requests: Vec<RunRequest>) -> Self {
        Self {
            requests,
            current: None,
            next: 0,
        }
    }

    pub fn requests(&self) -> &[RunRequest] {
        &self.requests
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&RunRequest> {
        self.current.map(|i| &self.requests[i])
    }

    /// Move to the next request. `None` once the queue is exhausted.
    pub fn advance(&mut self) -> Option<&RunRequest> {
        if self.next >= self.requests.len() {
            self.current = None;
            return None;
        }
        self.current = Some(self.next);
        self.next += 1;
        self.current()
    }

    /// Take every request that has not started yet. None of them will be advanced to.
    pub fn drain_pending(&mut self) -> Vec<RunRequest> {
        let pending = self.requests[self.next..].to_vec();
        self.next = self.requests.len();
        self.current = None;
        pending
    }
}
