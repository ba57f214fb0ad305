//! Execution plan types: ordered steps with typed parameter values, plus validation.
//!
//! A parameter value is either a literal or a reference into a prior step's response
//! (`$.steps[i].response.<path>`). References are parsed at deserialization time so the
//! executor never sees an unvalidated reference string.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::llm::LlmError;
use crate::metadata::{parse_label, EndpointDetail, MetadataError};

/// Planning failure.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Gateway(#[from] LlmError),

    /// The project has no endpoints to plan against.
    #[error("project has no endpoints")]
    NoEndpoints,

    /// Neither the model nor the fallback produced a usable plan.
    #[error("no suitable plan")]
    NoSuitablePlan,

    #[error("plan has no steps")]
    EmptyPlan,

    #[error("step {step} references unknown endpoint {endpoint:?}")]
    UnknownEndpoint { step: usize, endpoint: String },

    #[error("step {step} ({endpoint}) is missing required parameter {name:?}")]
    MissingParameter {
        step: usize,
        endpoint: String,
        name: String,
    },

    #[error("step {step} references step {referenced}, which has not run yet")]
    ForwardReference { step: usize, referenced: usize },
}

/// Reference into a prior step's response: `$.steps[<step>].response<path>`.
///
/// `path` is the JSONPath remainder including its leading `.` or `[` (empty for the
/// whole response).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRef {
    pub step: usize,
    pub path: String,
}

impl StepRef {
    pub fn render(&self) -> String {
        format!("$.steps[{}].response{}", self.step, self.path)
    }
}

/// Parses a reference string; `None` for anything that is not exactly the reference shape.
pub fn parse_step_ref(s: &str) -> Option<StepRef> {
    let rest = s.strip_prefix("$.steps[")?;
    let (index, rest) = rest.split_once(']')?;
    let step = index.parse().ok()?;
    let path = rest.strip_prefix(".response")?;
    if !(path.is_empty() || path.starts_with('.') || path.starts_with('[')) {
        return None;
    }
    Some(StepRef {
        step,
        path: path.to_string(),
    })
}

/// A plan parameter value: literal JSON, or a reference to prior step output.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    Reference(StepRef),
}

impl ParamValue {
    /// Strings of the reference shape become references; everything else is literal.
    pub fn from_value(value: Value) -> Self {
        if let Value::String(s) = &value {
            if let Some(r) = parse_step_ref(s) {
                return ParamValue::Reference(r);
            }
        }
        ParamValue::Literal(value)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ParamValue::Literal(value.into())
    }

    pub fn reference(step: usize, path: impl Into<String>) -> Self {
        ParamValue::Reference(StepRef {
            step,
            path: path.into(),
        })
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Literal(v) => v.serialize(serializer),
            ParamValue::Reference(r) => serializer.serialize_str(&r.render()),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

/// One plan step: the `METHOD /path` label plus named parameter values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

/// Ordered steps; later steps may reference earlier responses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn single(endpoint: impl Into<String>) -> Self {
        Self {
            steps: vec![PlanStep {
                endpoint: endpoint.into(),
                params: BTreeMap::new(),
            }],
        }
    }
}

/// Resolves a step label against the catalog.
pub fn endpoint_for_step<'a>(
    catalog: &'a [EndpointDetail],
    label: &str,
) -> Option<&'a EndpointDetail> {
    let (method, path) = parse_label(label)?;
    catalog
        .iter()
        .find(|d| d.endpoint.method == method && d.endpoint.path == path)
}

/// Checks a plan against the catalog: non-empty steps, known endpoints, every required
/// parameter present, and references pointing strictly backwards.
pub fn validate_plan(plan: &ExecutionPlan, catalog: &[EndpointDetail]) -> Result<(), PlanError> {
    if plan.steps.is_empty() {
        return Err(PlanError::EmptyPlan);
    }
    for (i, step) in plan.steps.iter().enumerate() {
        let Some(detail) = endpoint_for_step(catalog, &step.endpoint) else {
            return Err(PlanError::UnknownEndpoint {
                step: i,
                endpoint: step.endpoint.clone(),
            });
        };
        for required in detail.required_parameters() {
            if !step.params.contains_key(&required.name) {
                return Err(PlanError::MissingParameter {
                    step: i,
                    endpoint: detail.label(),
                    name: required.name.clone(),
                });
            }
        }
        for value in step.params.values() {
            if let ParamValue::Reference(r) = value {
                if r.step >= i {
                    return Err(PlanError::ForwardReference {
                        step: i,
                        referenced: r.step,
                    });
                }
            }
        }
    }
    Ok(())
}
