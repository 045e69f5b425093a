//! Configuration-driven policy.
//!
//! A small field-mapping evaluator for deployments without a rule engine.
//! `schema.<name>` queries map raw records to Structured Logs; the `event`
//! query maps storage events to sources by bucket, prefix and suffix.

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

use floe_core::PolicyEvaluator;
use floe_core::error::PolicyError;

use crate::load::EVENT_QUERY;
use crate::model::Source;

/// How raw records of one schema become Structured Logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaRule {
    pub dataset: String,
    pub table: String,
    #[serde(default)]
    pub partition: Option<String>,
    /// Dotted path of the event time, as epoch seconds or an RFC 3339 string.
    /// Records without one are stamped with the evaluation time.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Dotted path of a record ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Dotted path of an array whose elements are separate logs.
    #[serde(default)]
    pub records: Option<String>,
}

/// Sources to load for objects matching a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventRule {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    pub source: Source,
}

impl EventRule {
    fn matches(&self, bucket: &str, name: &str) -> bool {
        self.bucket.as_deref().is_none_or(|b| b == bucket)
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
    }
}

/// Policy rules from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingPolicyConfig {
    #[serde(default)]
    pub schemas: HashMap<String, SchemaRule>,
    #[serde(default)]
    pub events: Vec<EventRule>,
}

/// [`PolicyEvaluator`] backed by [`MappingPolicyConfig`].
#[derive(Debug, Clone, Default)]
pub struct MappingPolicy {
    config: MappingPolicyConfig,
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(value, |v, key| v.get(key))
}

fn epoch_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|t| {
            t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9
        }),
        _ => None,
    }
}

impl MappingPolicy {
    pub fn new(config: MappingPolicyConfig) -> Self {
        Self { config }
    }

    fn transform(&self, path: &str, name: &str, input: &Value) -> Result<Value, PolicyError> {
        let rule = self
            .config
            .schemas
            .get(name)
            .ok_or_else(|| PolicyError::QueryNotFound {
                path: path.to_string(),
            })?;
        let fail = |message: String| PolicyError::Evaluation {
            path: path.to_string(),
            message,
        };

        let items: Vec<&Value> = match &rule.records {
            None => vec![input],
            Some(records) => match lookup(input, records) {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(_) => return Err(fail(format!("'{records}' is not an array"))),
                None => Vec::new(),
            },
        };

        let now = chrono::Utc::now();
        let mut logs = Vec::with_capacity(items.len());
        for item in items {
            let timestamp = match &rule.timestamp {
                None => now.timestamp_micros() as f64 / 1e6,
                Some(field) => lookup(item, field)
                    .and_then(epoch_seconds)
                    .ok_or_else(|| fail(format!("no usable timestamp at '{field}'")))?,
            };
            let id = rule
                .id
                .as_deref()
                .and_then(|field| lookup(item, field))
                .and_then(Value::as_str);

            let mut log = Map::new();
            log.insert("id".into(), json!(id));
            log.insert("timestamp".into(), json!(timestamp));
            log.insert("data".into(), item.clone());
            log.insert("dataset".into(), rule.dataset.clone().into());
            log.insert("table".into(), rule.table.clone().into());
            if let Some(partition) = &rule.partition {
                log.insert("partition".into(), partition.clone().into());
            }
            log.insert("schema".into(), name.into());
            logs.push(Value::Object(log));
        }

        Ok(json!({ "logs": logs }))
    }

    fn sources(&self, input: &Value) -> Value {
        let bucket = input.get("bucket").and_then(Value::as_str).unwrap_or("");
        let name = input.get("name").and_then(Value::as_str).unwrap_or("");
        let sources: Vec<&Source> = self
            .config
            .events
            .iter()
            .filter(|rule| rule.matches(bucket, name))
            .map(|rule| &rule.source)
            .collect();
        json!({ "sources": sources })
    }
}

#[async_trait]
impl PolicyEvaluator for MappingPolicy {
    async fn query(&self, path: &str, input: &Value) -> Result<Value, PolicyError> {
        if path == EVENT_QUERY {
            return Ok(self.sources(input));
        }
        match path.strip_prefix("schema.") {
            Some(name) => self.transform(path, name, input),
            None => Err(PolicyError::QueryNotFound {
                path: path.to_string(),
            }),
        }
    }
}
