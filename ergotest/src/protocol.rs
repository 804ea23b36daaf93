// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker wire protocol (C7): one NDJSON request from parent to child,
//! a stream of NDJSON messages from child back to parent. `spec.md` §6
//! describes this as a structured-clone channel; `serde_json` over the
//! child's stdin/stdout is the direct analogue for process-boundary IPC.

use camino::Utf8PathBuf;
use ergotest_result::{SerializedTestCaseResult, SerializedTestSuiteResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The single message sent from parent to child at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub module_paths: Vec<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<Utf8PathBuf>,
}

/// One line of the child-to-parent NDJSON stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    Keepalive,
    Progress { result: SerializedTestCaseResult },
    Complete { result: SerializedTestSuiteResult },
    Fatal { message: String, err: serde_json::Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let request = WorkerRequest {
            module_paths: vec![Utf8PathBuf::from("/a.so")],
            timeout: Some(5000),
            config: None,
            renderer: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        let restored: WorkerRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.module_paths, request.module_paths);
    }

    #[test]
    fn keepalive_message_serializes_with_type_tag() {
        let json = serde_json::to_string(&WorkerMessage::Keepalive).unwrap();
        assert_eq!(json, r#"{"type":"keepalive"}"#);
    }

    #[test]
    fn fatal_message_round_trips() {
        let message = WorkerMessage::Fatal {
            message: "boom".to_string(),
            err: serde_json::json!({"kind": "panic"}),
        };
        let json = serde_json::to_string(&message).unwrap();
        let restored: WorkerMessage = serde_json::from_str(&json).unwrap();
        match restored {
            WorkerMessage::Fatal { message, .. } => assert_eq!(message, "boom"),
            _ => panic!("expected Fatal"),
        }
    }
}
