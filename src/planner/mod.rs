//! Planner trait and implementations
//!
//! A planner turns a query into an [`IntentAnalysis`] and then into an
//! [`ExecutionPlan`] over the tools in a [`ToolCatalog`].

use crate::context::ConversationContext;
use crate::intent::{self, IntentAnalysis};
use crate::models::{ExecutionPlan, PlanStep};
use crate::tools::params::Indicator;
use crate::tools::{ToolCatalog, ToolKind};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub mod llm;
pub use llm::LlmPlanner;

/// Symbol used when a tool-backed intent names no stock.
const DEFAULT_SYMBOL: &str = "SPY";

const DEFAULT_INDICATORS: [Indicator; 3] = [Indicator::Sma, Indicator::Rsi, Indicator::Macd];

#[async_trait]
pub trait Planner: Send + Sync {
    async fn analyze_intent(&self, query: &str, context: &ConversationContext) -> Result<IntentAnalysis>;

    async fn create_plan(
        &self,
        query: &str,
        intent: &IntentAnalysis,
        catalog: &ToolCatalog,
    ) -> Result<ExecutionPlan>;
}

/// Deterministic planner. Keeps the agent usable without an LLM and backs
/// [`LlmPlanner`] when the model output is unusable.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedPlanner;

impl RuleBasedPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str, context: &ConversationContext) -> IntentAnalysis {
        let mut analysis = intent::analyze(query);
        analysis.apply_hints(&context.hints(query));
        analysis
    }

    /// One independent step per (tool, symbol); the comparer gets a single
    /// step covering every symbol.
    pub fn plan(&self, intent: &IntentAnalysis, catalog: &ToolCatalog) -> ExecutionPlan {
        let symbols: Vec<String> = if intent.entities.symbols.is_empty() {
            vec![DEFAULT_SYMBOL.to_string()]
        } else {
            intent.entities.symbols.clone()
        };

        let mut steps = Vec::new();
        for key in &intent.required_tools {
            let Some(tool) = catalog.get(key) else {
                continue;
            };
            let spec = tool.spec();

            if spec.kind.is_multi_symbol() {
                let mut parameters = Map::new();
                parameters.insert("symbols".to_string(), json!(symbols));
                steps.push(PlanStep::new(spec.id, with_period(parameters, spec.kind, intent)));
                continue;
            }

            for symbol in &symbols {
                let parameters = step_parameters(spec.kind, symbol, intent);
                steps.push(PlanStep::new(spec.id, parameters));
            }
        }

        ExecutionPlan::new(steps)
    }
}

#[async_trait]
impl Planner for RuleBasedPlanner {
    async fn analyze_intent(&self, query: &str, context: &ConversationContext) -> Result<IntentAnalysis> {
        Ok(self.analyze(query, context))
    }

    async fn create_plan(
        &self,
        _query: &str,
        intent: &IntentAnalysis,
        catalog: &ToolCatalog,
    ) -> Result<ExecutionPlan> {
        Ok(self.plan(intent, catalog))
    }
}

fn step_parameters(kind: ToolKind, symbol: &str, intent: &IntentAnalysis) -> Value {
    let mut parameters = Map::new();
    parameters.insert("symbol".to_string(), json!(symbol));

    if kind == ToolKind::TechnicalIndicators {
        let indicators: Vec<&str> = if intent.entities.indicators.is_empty() {
            DEFAULT_INDICATORS.iter().map(Indicator::as_str).collect()
        } else {
            intent.entities.indicators.iter().map(Indicator::as_str).collect()
        };
        parameters.insert("indicators".to_string(), json!(indicators));
    }

    with_period(parameters, kind, intent)
}

fn with_period(mut parameters: Map<String, Value>, kind: ToolKind, intent: &IntentAnalysis) -> Value {
    // Fundamentals and statements have no period parameter.
    let takes_period = !matches!(kind, ToolKind::FundamentalAnalyzer | ToolKind::FinancialStatements);

    if let (true, Some(period)) = (takes_period, intent.entities.time_period) {
        parameters.insert("period".to_string(), json!(period.as_str()));
    }

    Value::Object(parameters)
}
