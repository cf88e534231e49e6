//! Response rendering
//!
//! Deterministic Markdown for plan results, used when no LLM is configured or
//! the LLM formatting call fails. Also builds the prompt for LLM formatting.

use crate::execution::ExecutionReport;
use crate::intent::{Intent, IntentAnalysis};
use crate::models::{step_key, ExecutionPlan, StepFailure};
use crate::tools::{find_spec, ToolKind};
use serde_json::Value;

/// Canned reply for intents that need no tools.
pub fn no_tools_response(intent: Intent) -> &'static str {
    match intent {
        Intent::Greeting => {
            "Hello! I can help you analyze stocks, view technical indicators, and check company fundamentals."
        }
        Intent::Help => {
            "I can: analyze individual stocks, compare multiple stocks, show technical indicators, and provide fundamental analysis."
        }
        _ => "I can help you with stock analysis. Try asking about specific stocks or indicators.",
    }
}

fn section_title(kind: Option<ToolKind>) -> &'static str {
    match kind {
        Some(ToolKind::StockAnalyzer) => "Stock Analysis",
        Some(ToolKind::FundamentalAnalyzer) => "Fundamental Analysis",
        Some(ToolKind::FinancialStatements) => "Financial Statements",
        Some(ToolKind::TechnicalIndicators) => "Technical Indicators",
        Some(ToolKind::PatternAnalyzer) => "Chart Patterns",
        Some(ToolKind::StockComparer) => "Performance Comparison",
        None => "Result",
    }
}

/// What a step was about, e.g. `AAPL` or `AAPL, MSFT`.
fn subject(parameters: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(symbol) = parameters.get("symbol").and_then(Value::as_str) {
        return Some(symbol.to_ascii_uppercase());
    }

    let symbols: Vec<String> = parameters
        .get("symbols")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_ascii_uppercase)
        .collect();
    (!symbols.is_empty()).then(|| symbols.join(", "))
}

/// Render every step's outcome in plan order.
pub fn render_results(plan: &ExecutionPlan, report: &ExecutionReport) -> String {
    if plan.is_empty() {
        return "No analysis results were produced.".to_string();
    }

    let mut sections = Vec::with_capacity(plan.len());

    for (index, step) in plan.steps.iter().enumerate() {
        let Some(result) = report.results.get(&step_key(index)) else {
            continue;
        };

        if let Some(failure) = StepFailure::from_value(result) {
            sections.push(format!("Error with {}: {}", failure.tool, failure.error));
            continue;
        }

        let kind = find_spec(&step.tool_id).map(|spec| spec.kind);
        let title = match subject(&step.parameters) {
            Some(subject) => format!("### {} ({})", section_title(kind), subject),
            None => format!("### {}", section_title(kind)),
        };

        // Application-level errors come back as a payload with an `error` field.
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            sections.push(format!("{}\n\n{} reported an error: {}", title, step.tool_id, error));
            continue;
        }

        let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        sections.push(format!("{}\n\n```json\n{}\n```", title, pretty));
    }

    if report.cancelled {
        sections.push("_Analysis was cancelled before every step finished._".to_string());
    }

    sections.join("\n\n")
}

/// Prompt asking the LLM to turn raw results into an answer.
pub fn format_prompt(query: &str, intent: &IntentAnalysis, report: &ExecutionReport) -> String {
    let results =
        serde_json::to_string_pretty(&report.results).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"Format the following analysis results into a clear, concise response.

QUESTION:
{}

INTENT:
{}

RESULTS:
{}

Guidelines:
- Start with a summary of key findings
- Use bullet points for important metrics
- Include specific numbers and percentages
- Mention any step that failed and what is missing because of it
- Provide actionable insights
- End with a recommendation if applicable
"#,
        query,
        intent.intent.as_str(),
        results,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{step_key, PlanStep};
    use serde_json::json;

    fn report_with(results: Vec<Value>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for (index, value) in results.into_iter().enumerate() {
            report.results.insert(step_key(index), value);
        }
        report
    }

    #[test]
    fn test_render_success_failure_and_payload_error() {
        let plan = ExecutionPlan::new(vec![
            PlanStep::new("stock_data.get_price", json!({"symbol": "aapl"})),
            PlanStep::new("technical.calculate_indicators", json!({"symbol": "AAPL"})),
            PlanStep::new("technical.compare_performance", json!({"symbols": ["AAPL", "MSFT"]})),
        ]);
        let report = report_with(vec![
            json!({"price": 187.2}),
            json!({"tool": "technical.calculate_indicators", "error": "Timed out after 30s"}),
            json!({"error": "no data for MSFT"}),
        ]);

        let text = render_results(&plan, &report);

        assert!(text.contains("### Stock Analysis (AAPL)"));
        assert!(text.contains("\"price\": 187.2"));
        assert!(text.contains("Error with technical.calculate_indicators: Timed out after 30s"));
        assert!(text.contains("### Performance Comparison (AAPL, MSFT)"));
        assert!(text.contains("reported an error: no data for MSFT"));
    }

    #[test]
    fn test_render_empty_and_cancelled() {
        assert_eq!(
            render_results(&ExecutionPlan::default(), &ExecutionReport::default()),
            "No analysis results were produced."
        );

        let plan = ExecutionPlan::new(vec![PlanStep::new("custom.tool", json!({}))]);
        let mut report = report_with(vec![json!({"ok": true})]);
        report.cancelled = true;

        let text = render_results(&plan, &report);
        assert!(text.starts_with("### Result"));
        assert!(text.contains("cancelled"));
    }

    #[test]
    fn test_canned_responses() {
        assert!(no_tools_response(Intent::Greeting).starts_with("Hello!"));
        assert!(no_tools_response(Intent::Help).starts_with("I can:"));
        assert_eq!(
            no_tools_response(Intent::Unknown),
            no_tools_response(Intent::AnalyzeStock)
        );
    }
}
