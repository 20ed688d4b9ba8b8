//! Response payloads returned to callers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Returned by the ingress once the request is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AcceptedResponse {
    pub task_id: TaskId,
    pub status: String,
}

impl AcceptedResponse {
    pub fn accepted(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: "accepted".to_string(),
        }
    }
}

/// Returned by the orchestrator once the job graph is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingSummary {
    pub task_id: TaskId,
    pub status: String,
    pub total_combinations: u64,
}

impl ProcessingSummary {
    pub fn processing(task_id: TaskId, total_combinations: u64) -> Self {
        Self {
            task_id,
            status: "processing".to_string(),
            total_combinations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_json() {
        let resp = AcceptedResponse::accepted(TaskId::from_string("t-1"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["task_id"], "t-1");
        assert_eq!(json["status"], "accepted");
    }

    #[test]
    fn test_processing_summary() {
        let summary = ProcessingSummary::processing(TaskId::from_string("t-2"), 6);
        assert_eq!(summary.status, "processing");
        assert_eq!(summary.total_combinations, 6);
    }
}
