//! Reference placeholders in step parameters
//!
//! A string parameter of the form `"$<key>"` names an entry of the running
//! result map and `"$context.<key>"` an entry of the conversation context.
//! Only the first `$` is a sigil: `"$$5"` looks up the key `"$5"`.
//! Placeholders that find no value pass through literally and are reported
//! back to the caller instead of failing the step.

use crate::models::ResultMap;
use serde_json::{Map, Value};

const SIGIL: char = '$';
const CONTEXT_PREFIX: &str = "context.";

/// How a single string parameter is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Plain text.
    Literal(&'a str),
    /// Key into the result map.
    Result(&'a str),
    /// Key into the conversation context.
    Context(&'a str),
}

impl<'a> Reference<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let Some(rest) = raw.strip_prefix(SIGIL) else {
            return Reference::Literal(raw);
        };

        if let Some(key) = rest.strip_prefix(CONTEXT_PREFIX) {
            if !key.is_empty() {
                return Reference::Context(key);
            }
        }

        if rest.is_empty() {
            Reference::Literal(raw)
        } else {
            Reference::Result(rest)
        }
    }
}

/// Outcome of resolving one parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    /// Placeholders left in place because nothing was stored under their key.
    pub unresolved: Vec<String>,
}

/// Substitutes placeholders from a result map and, optionally, a context map.
pub struct Resolver<'a> {
    results: &'a ResultMap,
    context: Option<&'a Map<String, Value>>,
}

impl<'a> Resolver<'a> {
    pub fn new(results: &'a ResultMap) -> Self {
        Self {
            results,
            context: None,
        }
    }

    pub fn with_context(mut self, context: &'a Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn resolve(&self, value: &Value) -> Resolved<Value> {
        let mut unresolved = Vec::new();
        let value = self.resolve_value(value, &mut unresolved);
        Resolved { value, unresolved }
    }

    pub fn resolve_parameters(&self, parameters: &Map<String, Value>) -> Resolved<Map<String, Value>> {
        let mut unresolved = Vec::new();
        let value = self.resolve_object(parameters, &mut unresolved);
        Resolved { value, unresolved }
    }

    fn resolve_value(&self, value: &Value, unresolved: &mut Vec<String>) -> Value {
        match value {
            Value::String(raw) => self.resolve_string(raw, unresolved),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(item, unresolved))
                    .collect(),
            ),
            Value::Object(object) => Value::Object(self.resolve_object(object, unresolved)),
            scalar => scalar.clone(),
        }
    }

    fn resolve_object(&self, object: &Map<String, Value>, unresolved: &mut Vec<String>) -> Map<String, Value> {
        object
            .iter()
            .map(|(key, value)| (key.clone(), self.resolve_value(value, unresolved)))
            .collect()
    }

    fn resolve_string(&self, raw: &str, unresolved: &mut Vec<String>) -> Value {
        let found = match Reference::parse(raw) {
            Reference::Literal(text) => return Value::String(text.to_string()),
            Reference::Result(key) => self.results.get(key),
            Reference::Context(key) => self.context.and_then(|context| context.get(key)),
        };

        match found {
            Some(value) => value.clone(),
            None => {
                unresolved.push(raw.to_string());
                Value::String(raw.to_string())
            }
        }
    }
}

/// Substitute `"$<key>"` placeholders against `results`.
pub fn resolve_references(parameters: &Value, results: &ResultMap) -> Value {
    Resolver::new(results).resolve(parameters).value
}

/// Substitute placeholders against `results` and the conversation `context`,
/// reporting every placeholder that stayed literal.
pub fn resolve_with_context(
    parameters: &Value,
    results: &ResultMap,
    context: &Map<String, Value>,
) -> Resolved<Value> {
    Resolver::new(results).with_context(context).resolve(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results(value: Value) -> ResultMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("test results must be an object"),
        }
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(Reference::parse("AAPL"), Reference::Literal("AAPL"));
        assert_eq!(Reference::parse("$step_0"), Reference::Result("step_0"));
        assert_eq!(Reference::parse("$context.last_symbol"), Reference::Context("last_symbol"));
        assert_eq!(Reference::parse("$$step_0"), Reference::Result("$step_0"));
        assert_eq!(Reference::parse("$"), Reference::Literal("$"));
        assert_eq!(Reference::parse("$context."), Reference::Result("context."));
    }

    #[test]
    fn test_missing_reference_passes_through() {
        let empty = ResultMap::new();
        assert_eq!(resolve_references(&json!("$missing"), &empty), json!("$missing"));

        let resolved = Resolver::new(&empty).resolve(&json!({"a": ["$missing", 3]}));
        assert_eq!(resolved.value, json!({"a": ["$missing", 3]}));
        assert_eq!(resolved.unresolved, vec!["$missing".to_string()]);
    }

    #[test]
    fn test_substitutes_whole_result_value() {
        let available = results(json!({"step_0": {"price": 100}}));
        assert_eq!(
            resolve_references(&json!({"base": "$step_0"}), &available),
            json!({"base": {"price": 100}})
        );
    }

    #[test]
    fn test_walks_nested_structures_and_keeps_scalars() {
        let available = results(json!({"step_0": "AAPL", "step_1": [1, 2]}));
        let params = json!({
            "symbols": ["$step_0", "MSFT"],
            "nested": {"series": "$step_1", "flag": true, "n": 3.5, "none": null},
        });

        assert_eq!(
            resolve_references(&params, &available),
            json!({
                "symbols": ["AAPL", "MSFT"],
                "nested": {"series": [1, 2], "flag": true, "n": 3.5, "none": null},
            })
        );
    }

    #[test]
    fn test_input_is_not_mutated() {
        let available = results(json!({"step_0": 1}));
        let params = json!({"x": "$step_0"});
        let _ = resolve_references(&params, &available);
        assert_eq!(params, json!({"x": "$step_0"}));
    }

    #[test]
    fn test_context_references() {
        let available = results(json!({"context.symbol": "WRONG"}));
        let context = results(json!({"symbol": "NVDA"}));

        let resolved = resolve_with_context(
            &json!({"symbol": "$context.symbol", "period": "$context.period"}),
            &available,
            &context,
        );

        assert_eq!(
            resolved.value,
            json!({"symbol": "NVDA", "period": "$context.period"})
        );
        assert_eq!(resolved.unresolved, vec!["$context.period".to_string()]);
    }

    #[test]
    fn test_context_reference_without_context_is_unresolved() {
        let empty = ResultMap::new();
        assert_eq!(
            resolve_references(&json!("$context.symbol"), &empty),
            json!("$context.symbol")
        );
    }

    #[test]
    fn test_double_sigil_missing_key_is_unchanged() {
        let empty = ResultMap::new();
        let params = json!({"note": "$$5", "ref": "$$step_0"});

        let resolved = Resolver::new(&empty).resolve(&params);

        assert_eq!(resolved.value, params);
        assert_eq!(resolved.unresolved.len(), 2);
    }

    #[test]
    fn test_double_sigil_looks_up_key_with_leading_sigil() {
        let available = results(json!({"$5": "five", "5": "not this one"}));
        assert_eq!(
            resolve_references(&json!({"price": "$$5"}), &available),
            json!({"price": "five"})
        );
    }
}
