//! In-process policy evaluation backed by `regorus`.
//!
//! A module is parsed and analyzed once, the query is bound to it once, and
//! the resulting `PreparedQuery` clones the loaded engine per evaluation, so
//! it can be shared across threads without locking.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

const MODULE_PATH: &str = "policy.rego";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("policy does not compile: {0}")]
    Compile(String),

    #[error("invalid query '{query}': {message}")]
    Query { query: String, message: String },

    #[error("rego evaluation error: {0}")]
    Evaluation(String),
}

fn describe(err: anyhow::Error) -> String {
    format!("{err:#}")
}

/// A parsed and analyzed policy module.
#[derive(Debug, Clone)]
pub struct Policy {
    engine: regorus::Engine,
    package: String,
}

impl Policy {
    pub fn compile(source: &str) -> Result<Self, PolicyError> {
        let mut engine = regorus::Engine::new();
        let package = engine
            .add_policy(MODULE_PATH.to_string(), source.to_string())
            .map_err(|e| PolicyError::Compile(describe(e)))?;

        // Parsing alone does not schedule rule bodies; a constant query runs
        // the analyzer so unsafe variables and bad imports fail here.
        engine
            .eval_query("true".to_string(), false)
            .map_err(|e| PolicyError::Compile(describe(e)))?;

        Ok(Self { engine, package })
    }

    /// Dotted package name, e.g. `http.authz`.
    pub fn package(&self) -> &str {
        self.package.strip_prefix("data.").unwrap_or(&self.package)
    }

    /// Binds `query` (a reference such as `data.http.authz.allow`) to this
    /// module. Queries naming neither a rule nor this module's package are
    /// rejected here, not at evaluation time.
    pub fn prepare(&self, query: &str) -> Result<PreparedQuery, PolicyError> {
        let text = query.trim();
        let invalid = |message: String| PolicyError::Query {
            query: text.to_string(),
            message,
        };

        if text != "data" && !text.starts_with("data.") {
            return Err(invalid("query must start with 'data'".to_string()));
        }

        let mut engine = self.engine.clone();
        if !self.names_package(text) {
            engine
                .compile_with_entrypoint(&text.into())
                .map_err(|e| invalid(describe(e)))?;
        }

        Ok(PreparedQuery {
            engine,
            text: text.to_string(),
        })
    }

    fn names_package(&self, text: &str) -> bool {
        self.package == text
            || self
                .package
                .strip_prefix(text)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// Compiles `module` and prepares `query` against it in one step.
pub fn prepare(module: &str, query: &str) -> Result<PreparedQuery, PolicyError> {
    Policy::compile(module)?.prepare(query)
}

#[derive(Debug, Clone)]
pub struct PreparedQuery {
    engine: regorus::Engine,
    text: String,
}

impl PreparedQuery {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluates against `input`. An undefined query yields an empty result set.
    pub fn eval(&self, input: &Value) -> Result<ResultSet, PolicyError> {
        let mut engine = self.engine.clone();
        engine.set_input(regorus::Value::from(input.clone()));

        let results = engine
            .eval_query(self.text.clone(), false)
            .map_err(|e| PolicyError::Evaluation(describe(e)))?;

        results
            .result
            .into_iter()
            .map(QueryResult::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(ResultSet)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionValue {
    pub value: Value,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub expressions: Vec<ExpressionValue>,
}

impl TryFrom<regorus::QueryResult> for QueryResult {
    type Error = PolicyError;

    fn try_from(result: regorus::QueryResult) -> Result<Self, Self::Error> {
        let expressions = result
            .expressions
            .into_iter()
            .map(|expression| {
                let value = serde_json::to_value(&expression.value)
                    .map_err(|e| PolicyError::Evaluation(e.to_string()))?;
                Ok(ExpressionValue {
                    value,
                    text: expression.text.to_string(),
                })
            })
            .collect::<Result<_, PolicyError>>()?;

        Ok(Self { expressions })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet(pub Vec<QueryResult>);

impl ResultSet {
    /// Exactly one result holding exactly one expression whose value is `true`.
    pub fn allowed(&self) -> bool {
        match self.0.as_slice() {
            [result] => matches!(
                result.expressions.as_slice(),
                [ExpressionValue {
                    value: Value::Bool(true),
                    ..
                }]
            ),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
