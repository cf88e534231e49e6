//! Core data models for the genesis agent

use crate::error::AgentError;
use crate::llm::strip_code_fence;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

//
// ================= Plan =================
//

/// One tool invocation inside an execution plan.
///
/// The step's position in [`ExecutionPlan::steps`] is its identity: it is what
/// `depends_on` refers to and what the result key (`step_<index>`) is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(alias = "tool_name")]
    pub tool_id: String,
    /// May embed `"$<key>"` / `"$context.<key>"` placeholders.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

impl PlanStep {
    pub fn new(tool_id: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Self {
            tool_id: tool_id.into(),
            parameters,
            depends_on: Vec::new(),
        }
    }

    pub fn after(mut self, dependencies: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on.extend(dependencies);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Accepts a bare step array or an object with a `steps` array.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw_steps = match value {
            Value::Array(steps) => steps,
            Value::Object(record) => match record.get("steps") {
                Some(Value::Array(steps)) => steps,
                Some(other) => {
                    return Err(AgentError::MalformedPlan(format!(
                        "'steps' must be an array, found {}",
                        json_kind(other)
                    )))
                }
                None => {
                    return Err(AgentError::MalformedPlan(
                        "plan object has no 'steps' field".to_string(),
                    ))
                }
            },
            other => {
                return Err(AgentError::MalformedPlan(format!(
                    "expected a step array or an object with 'steps', found {}",
                    json_kind(other)
                )))
            }
        };

        let steps = raw_steps
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                PlanStep::deserialize(raw).map_err(|e| {
                    AgentError::MalformedPlan(format!("step {}: {}", index, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { steps })
    }

    /// Parse LLM output, tolerating a surrounding Markdown code fence.
    pub fn from_llm_output(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
            AgentError::MalformedPlan(format!("plan is not valid JSON: {}", e))
        })?;
        Self::from_value(&value)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Distinct tool ids in step order.
    pub fn tool_ids(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if !seen.contains(&step.tool_id) {
                seen.push(step.tool_id.clone());
            }
        }
        seen
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//
// ================= Results =================
//

/// Aggregated plan output keyed by `step_<index>`.
pub type ResultMap = Map<String, Value>;

pub fn step_key(index: usize) -> String {
    format!("step_{}", index)
}

/// Result entry recorded for a step whose invocation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub tool: String,
    pub error: String,
}

impl StepFailure {
    pub fn new(tool: &str, error: &AgentError) -> Self {
        Self {
            tool: tool.to_string(),
            error: error.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "tool": self.tool,
            "error": self.error,
        })
    }

    /// Recognize an executor failure entry. Tool payloads that merely carry an
    /// `error` field (application-level errors) have no `tool` key and are not
    /// matched.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 2 {
            return None;
        }
        Some(Self {
            tool: object.get("tool")?.as_str()?.to_string(),
            error: object.get("error")?.as_str()?.to_string(),
        })
    }
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepObservation {
    pub index: usize,
    pub level: usize,
    pub tool_id: String,
    pub status: ExecutionStatus,
    pub execution_time_ms: u64,
    /// Placeholders that found no value and were passed through literally.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_references: Vec<String>,
}

//
// ================= Agent Output =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub intent: String,
    pub confidence: f32,
    pub tools_used: Vec<String>,
    pub steps: usize,
    pub failed_steps: usize,
    pub execution_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default)]
    pub error: bool,
}

impl AgentResponse {
    pub fn failure(error: &AgentError) -> Self {
        Self {
            response: format!(
                "I encountered an error while processing your request: {}",
                error
            ),
            metadata: None,
            error: true,
        }
    }
}

/// One frame of a streamed agent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Status { message: String },
    Content { chunk: String },
    Metadata { metadata: Value },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_from_bare_sequence() {
        let plan = ExecutionPlan::from_value(&json!([
            {"tool_id": "A", "parameters": {}, "depends_on": []},
            {"tool_id": "B", "parameters": {"x": "$step_0"}, "depends_on": [0]}
        ]))
        .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[1].depends_on, vec![0]);
        assert_eq!(plan.steps[1].parameters["x"], json!("$step_0"));
    }

    #[test]
    fn test_plan_from_steps_record_with_defaults() {
        let plan = ExecutionPlan::from_value(&json!({
            "steps": [{"tool_name": "stock_data.get_price"}],
            "description": "ignored"
        }))
        .unwrap();

        assert_eq!(plan.steps[0].tool_id, "stock_data.get_price");
        assert!(plan.steps[0].parameters.is_empty());
        assert!(plan.steps[0].depends_on.is_empty());
    }

    #[test]
    fn test_malformed_plan_shapes() {
        for bad in [json!("steps"), json!(42), json!({"plan": []}), json!({"steps": {}})] {
            let err = ExecutionPlan::from_value(&bad).unwrap_err();
            assert!(matches!(err, AgentError::MalformedPlan(_)), "{bad}");
        }
    }

    #[test]
    fn test_malformed_step_is_reported_with_index() {
        let err = ExecutionPlan::from_value(&json!([
            {"tool_id": "A"},
            {"tool_id": "B", "depends_on": [-1]}
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("step 1"));
    }

    #[test]
    fn test_plan_from_fenced_llm_output() {
        let text = "```json\n{\"steps\": [{\"tool_id\": \"A\", \"parameters\": {\"symbol\": \"AAPL\"}}]}\n```";
        let plan = ExecutionPlan::from_llm_output(text).unwrap();
        assert_eq!(plan.steps[0].parameters["symbol"], json!("AAPL"));
    }

    #[test]
    fn test_step_failure_detection() {
        let failure = StepFailure {
            tool: "A".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(StepFailure::from_value(&failure.to_value()), Some(failure));

        // Application-level error payloads are successful calls.
        let payload = json!({"error": "no data", "symbol": "ZZZZ", "timestamp": "t"});
        assert_eq!(StepFailure::from_value(&payload), None);
    }

    #[test]
    fn test_stream_chunk_wire_format() {
        let chunk = StreamChunk::Content {
            chunk: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"type": "content", "chunk": "hello"})
        );
    }
}
