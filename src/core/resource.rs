//! Resource request/response shapes shared by the pool, queue, and jobs.

use serde::{Deserialize, Serialize};

/// A single named instance of a typed resource, e.g. one CPU core or one GPU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceInstance {
    /// Stable identifier within its type, e.g. `"0"`, `"1"`.
    pub id: String,
    /// Slots currently available on this instance.
    pub slots: u32,
}

/// One entry of a resource request: "I need `slots` of `type`".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceNeed {
    /// Resource type, e.g. `"cpus"`, `"gpus"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Slots needed.
    pub slots: u32,
}

/// A request is a list of independent groups; each group is itself a list of
/// needs. A job with two co-allocations (e.g. one CPU group and one GPU
/// group) has two groups.
pub type ResourceRequest = Vec<Vec<ResourceNeed>>;

/// What was actually handed out for one group: type -> instances supplied.
pub type AcquiredGroup = std::collections::HashMap<String, Vec<ResourceInstance>>;

/// The full reply to a [`ResourceRequest`]: one `AcquiredGroup` per request
/// group, in order.
pub type AcquiredResources = Vec<AcquiredGroup>;

/// True if a request contains at least one need somewhere.
pub fn request_is_empty(request: &ResourceRequest) -> bool {
    request.iter().all(|group| group.is_empty())
}

/// Sum of slots requested per type across every group of a request.
pub fn slots_needed_by_type(request: &ResourceRequest) -> std::collections::HashMap<String, u32> {
    let mut totals = std::collections::HashMap::new();
    for group in request {
        for need in group {
            *totals.entry(need.kind.clone()).or_insert(0) += need.slots;
        }
    }
    totals
}
