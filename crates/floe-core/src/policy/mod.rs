//! Policy evaluation capability.
//!
//! A policy maps an input document to an output document under a named
//! query path (`schema.<name>` for record transforms, `event` for turning a
//! storage event into load sources). The rule language itself lives behind
//! [`PolicyEvaluator`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DecodeSnafu, PolicyError};

/// A reference-counted policy handle.
pub type PolicyEvaluatorRef = Arc<dyn PolicyEvaluator>;

/// Evaluates a policy query against an input document.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn query(&self, path: &str, input: &Value) -> Result<Value, PolicyError>;
}

/// Typed access to policy output.
#[async_trait]
pub trait PolicyEvaluatorExt: PolicyEvaluator {
    /// Query and decode the output into `T`.
    async fn query_as<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        input: &Value,
    ) -> Result<T, PolicyError> {
        let output = self.query(path, input).await?;
        serde_json::from_value(output).context(DecodeSnafu { path })
    }
}

impl<T: PolicyEvaluator + ?Sized> PolicyEvaluatorExt for T {}

type RuleFn = Box<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Closure-backed policy, one closure per query path.
#[derive(Default)]
pub struct MemoryPolicy {
    rules: HashMap<String, RuleFn>,
}

impl std::fmt::Debug for MemoryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPolicy")
            .field("paths", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for `path`, replacing any previous one.
    pub fn with_rule<F>(mut self, path: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.rules.insert(path.into(), Box::new(rule));
        self
    }
}

#[async_trait]
impl PolicyEvaluator for MemoryPolicy {
    async fn query(&self, path: &str, input: &Value) -> Result<Value, PolicyError> {
        let rule = self.rules.get(path).context(crate::error::QueryNotFoundSnafu { path })?;
        rule(input).map_err(|message| PolicyError::Evaluation {
            path: path.to_string(),
            message,
        })
    }
}
