//! LLM-backed planner
//!
//! Asks the model for a JSON intent and a JSON step list. Anything the model
//! gets wrong degrades to [`RuleBasedPlanner`] instead of failing the request.

use super::{Planner, RuleBasedPlanner};
use crate::context::ConversationContext;
use crate::error::AgentError;
use crate::intent::{self, Intent, IntentAnalysis, StockEntities};
use crate::llm::{strip_code_fence, CompletionOptions, LlmClient};
use crate::models::ExecutionPlan;
use crate::tools::params::{Indicator, Period, Symbol};
use crate::tools::{find_spec, ToolCatalog};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const INTENT_TEMPERATURE: f32 = 0.3;
const PLAN_TEMPERATURE: f32 = 0.2;

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    fallback: RuleBasedPlanner,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback: RuleBasedPlanner::new(),
        }
    }

    fn build_intent_prompt(&self, query: &str, context: &ConversationContext) -> String {
        format!(
            r#"Analyze the following financial query and determine the user's intent.

QUERY:
{}

CONVERSATION:
{}

Intents: analyze_stock, compare_stocks, technical_analysis, fundamental_analysis, market_overview, greeting, help, unknown
Tool keys: stock_analyzer, fundamental_analyzer, financial_statements, technical_indicators, pattern_analyzer, stock_comparer
Time periods: {}
Indicators: {}

Rules:
- Return ONLY valid JSON
- No explanation text
- JSON format:

{{
  "intent": "analyze_stock",
  "entities": {{ "symbols": ["AAPL"], "time_period": "1y", "indicators": ["rsi"] }},
  "confidence": 0.9,
  "reasoning": "...",
  "required_tools": ["stock_analyzer"]
}}
"#,
            query,
            context.prompt_summary(),
            wire_list(Period::ALL),
            wire_list(Indicator::ALL),
        )
    }

    fn build_plan_prompt(&self, query: &str, intent: &IntentAnalysis, catalog: &ToolCatalog) -> String {
        format!(
            r#"Create an execution plan for the following query using the available tools.

QUERY:
{}

INTENT:
{} (symbols: {}; period: {}; indicators: {})

SUGGESTED TOOLS:
{}

AVAILABLE TOOLS:
{}

Rules:
- Use only the Tool IDs listed above
- parameters must match the tool's parameter example; do not invent keys
- depends_on lists the indices of earlier steps that must finish first
- A string parameter "$step_<i>" is replaced by the output of step i
- Steps without dependencies run in parallel; prefer independent steps
- Return ONLY valid JSON
- No explanation text
- JSON format:

{{
  "steps": [
    {{ "tool_id": "stock_data.get_price", "parameters": {{ "symbol": "AAPL" }}, "depends_on": [] }}
  ]
}}
"#,
            query,
            intent.intent.as_str(),
            if intent.entities.symbols.is_empty() {
                "none".to_string()
            } else {
                intent.entities.symbols.join(", ")
            },
            intent
                .entities
                .time_period
                .map(|p| p.as_str())
                .unwrap_or("default"),
            wire_list(&intent.entities.indicators),
            intent.required_tools.join(", "),
            catalog.describe_for_prompt(),
        )
    }

    async fn request_intent(&self, query: &str, context: &ConversationContext) -> Result<IntentAnalysis> {
        let prompt = self.build_intent_prompt(query, context);
        let response = self
            .llm
            .complete(&prompt, &CompletionOptions::json(INTENT_TEMPERATURE))
            .await?;

        let raw: RawIntent = serde_json::from_str(strip_code_fence(&response))
            .map_err(|e| AgentError::LlmError(format!("intent is not valid JSON: {}", e)))?;

        let mut analysis = raw.normalize(query);
        analysis.apply_hints(&context.hints(query));
        Ok(analysis)
    }

    async fn request_plan(
        &self,
        query: &str,
        intent: &IntentAnalysis,
        catalog: &ToolCatalog,
    ) -> Result<ExecutionPlan> {
        let prompt = self.build_plan_prompt(query, intent, catalog);
        let response = self
            .llm
            .complete(&prompt, &CompletionOptions::json(PLAN_TEMPERATURE))
            .await?;

        ExecutionPlan::from_llm_output(&response)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn analyze_intent(&self, query: &str, context: &ConversationContext) -> Result<IntentAnalysis> {
        match self.request_intent(query, context).await {
            Ok(analysis) => {
                debug!(intent = analysis.intent.as_str(), confidence = analysis.confidence, "LLM intent");
                Ok(analysis)
            }
            Err(e) => {
                warn!(error = %e, "LLM intent analysis failed, using keyword analysis");
                Ok(self.fallback.analyze(query, context))
            }
        }
    }

    async fn create_plan(
        &self,
        query: &str,
        intent: &IntentAnalysis,
        catalog: &ToolCatalog,
    ) -> Result<ExecutionPlan> {
        if !intent.needs_tools() {
            return Ok(ExecutionPlan::default());
        }

        match self.request_plan(query, intent, catalog).await {
            Ok(plan) if !plan.is_empty() => {
                debug!(steps = plan.len(), "LLM plan");
                Ok(plan)
            }
            Ok(_) => {
                warn!("LLM returned an empty plan, using rule-based plan");
                Ok(self.fallback.plan(intent, catalog))
            }
            Err(e) => {
                warn!(error = %e, "LLM planning failed, using rule-based plan");
                Ok(self.fallback.plan(intent, catalog))
            }
        }
    }
}

/// Intent as the model writes it; every field is loose text.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIntent {
    intent: String,
    entities: RawEntities,
    confidence: Option<f32>,
    reasoning: String,
    required_tools: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntities {
    symbols: Vec<String>,
    time_period: Option<String>,
    indicators: Vec<String>,
}

impl RawIntent {
    fn normalize(self, query: &str) -> IntentAnalysis {
        let intent = Intent::parse(&self.intent);

        let mut symbols: Vec<String> = Vec::new();
        for raw in &self.entities.symbols {
            if let Ok(symbol) = raw.parse::<Symbol>() {
                if !symbols.iter().any(|s| s == symbol.as_str()) {
                    symbols.push(symbol.into());
                }
            }
        }
        // The model sometimes drops tickers the keyword extractor sees.
        if symbols.is_empty() {
            symbols = intent::extract_symbols(query);
        }

        let entities = StockEntities {
            symbols,
            time_period: self
                .entities
                .time_period
                .as_deref()
                .and_then(|p| p.parse().ok())
                .or_else(|| intent::extract_time_period(query)),
            indicators: self
                .entities
                .indicators
                .iter()
                .filter_map(|i| i.parse().ok())
                .collect(),
        };

        let mut analysis = IntentAnalysis::new(
            intent,
            entities,
            self.confidence.unwrap_or(0.5),
            self.reasoning,
        );

        let mut tools: Vec<String> = Vec::new();
        for spec in self.required_tools.iter().filter_map(|name| find_spec(name.trim())) {
            if !tools.iter().any(|t| t == spec.key) {
                tools.push(spec.key.to_string());
            }
        }
        if analysis.needs_tools() && !tools.is_empty() {
            analysis.required_tools = tools;
        }

        analysis
    }
}

fn wire_list<T: std::fmt::Display>(values: &[T]) -> String {
    if values.is_empty() {
        return "none".to_string();
    }
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<(String, f32)>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), options.temperature));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::LlmError("no scripted reply".to_string())))
        }
    }

    fn catalog() -> ToolCatalog {
        ToolCatalog::from_settings(&Settings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_model_intent_is_normalized() {
        let llm = ScriptedLlm::new(vec![Ok(r#"```json
{"intent": "Technical_Analysis",
 "entities": {"symbols": ["nvda", "nvda", "not a ticker"], "time_period": "6MO", "indicators": ["RSI", "vwap"]},
 "confidence": 1.7,
 "reasoning": "asks about RSI",
 "required_tools": ["technical_indicators", "news_analyzer", "technical.analyze_patterns"]}
```"#
            .to_string())]);
        let planner = LlmPlanner::new(llm.clone());

        let analysis = planner
            .analyze_intent("RSI for nvda over 6 months", &ConversationContext::new("c"))
            .await
            .unwrap();

        assert_eq!(analysis.intent, Intent::TechnicalAnalysis);
        assert_eq!(analysis.entities.symbols, vec!["NVDA"]);
        assert_eq!(analysis.entities.time_period, Some(Period::SixMonths));
        assert_eq!(analysis.entities.indicators, vec![Indicator::Rsi]);
        assert_eq!(analysis.confidence, 1.0);
        assert_eq!(analysis.required_tools, vec!["technical_indicators", "pattern_analyzer"]);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts[0].1, INTENT_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_intent_falls_back_on_bad_output() {
        let llm = ScriptedLlm::new(vec![Ok("I think they want AAPL".to_string())]);
        let planner = LlmPlanner::new(llm);

        let analysis = planner
            .analyze_intent("Compare AAPL vs MSFT", &ConversationContext::new("c"))
            .await
            .unwrap();

        assert_eq!(analysis.intent, Intent::CompareStocks);
        assert_eq!(analysis.entities.symbols, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_model_plan_with_dependencies_is_used() {
        let llm = ScriptedLlm::new(vec![Ok(r#"{"steps": [
            {"tool_id": "stock_data.get_price", "parameters": {"symbol": "AAPL"}},
            {"tool_id": "technical.calculate_indicators",
             "parameters": {"symbol": "AAPL", "indicators": ["rsi"]},
             "depends_on": [0]}
        ]}"#
        .to_string())]);
        let planner = LlmPlanner::new(llm.clone());
        let intent = intent::analyze("Analyze AAPL");

        let plan = planner.create_plan("Analyze AAPL", &intent, &catalog()).await.unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[1].depends_on, vec![0]);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts[0].1, PLAN_TEMPERATURE);
        assert!(prompts[0].0.contains("Tool ID: technical.compare_performance"));
        assert!(prompts[0].0.contains("$step_<i>"));
    }

    #[tokio::test]
    async fn test_plan_falls_back_when_empty_or_failed() {
        let intent = intent::analyze("Analyze AAPL");
        let expected = RuleBasedPlanner::new().plan(&intent, &catalog());

        let empty = LlmPlanner::new(ScriptedLlm::new(vec![Ok("[]".to_string())]));
        let plan = empty.create_plan("Analyze AAPL", &intent, &catalog()).await.unwrap();
        assert_eq!(plan, expected);

        let failing = LlmPlanner::new(ScriptedLlm::new(vec![Err(AgentError::LlmError(
            "quota".to_string(),
        ))]));
        let plan = failing.create_plan("Analyze AAPL", &intent, &catalog()).await.unwrap();
        assert_eq!(plan, expected);
    }

    #[tokio::test]
    async fn test_no_model_call_when_no_tools_needed() {
        let llm = ScriptedLlm::new(Vec::new());
        let planner = LlmPlanner::new(llm.clone());
        let intent = intent::analyze("hello");

        let plan = planner.create_plan("hello", &intent, &catalog()).await.unwrap();

        assert!(plan.is_empty());
        assert!(llm.prompts.lock().unwrap().is_empty());
    }
}
