//! Typed parameter schemas, one per tool
//!
//! Plan parameters are validated here before any network call. Unknown keys
//! are rejected rather than renamed, and every enumerated value (periods,
//! intervals, indicators, ...) must be one the tool servers accept.

use super::spec::ToolKind;
use crate::error::AgentError;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declares a closed set of wire strings. Parsing is case-insensitive and
/// serialization always emits the canonical lowercase form.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(raw: &str) -> std::result::Result<Self, String> {
                match raw.trim().to_ascii_lowercase().as_str() {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(format!(
                        "unsupported {} '{}' (expected one of: {})",
                        $what,
                        raw,
                        [$($wire),+].join(", ")
                    )),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(raw: String) -> std::result::Result<Self, String> {
                raw.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Look-back window for historical data.
    Period, "period" {
        OneDay => "1d",
        FiveDays => "5d",
        OneMonth => "1mo",
        ThreeMonths => "3mo",
        SixMonths => "6mo",
        OneYear => "1y",
        TwoYears => "2y",
        FiveYears => "5y",
        TenYears => "10y",
        YearToDate => "ytd",
        Max => "max",
    }
);

wire_enum!(
    /// Bar size for price history.
    Interval, "interval" {
        OneMinute => "1m",
        FiveMinutes => "5m",
        FifteenMinutes => "15m",
        ThirtyMinutes => "30m",
        OneHour => "1h",
        OneDay => "1d",
        OneWeek => "1wk",
        OneMonth => "1mo",
    }
);

wire_enum!(
    StatementType, "statement type" {
        Income => "income",
        Balance => "balance",
        Cashflow => "cashflow",
    }
);

wire_enum!(
    Indicator, "indicator" {
        Sma => "sma",
        Ema => "ema",
        Rsi => "rsi",
        Macd => "macd",
        Bollinger => "bollinger",
        Stochastic => "stochastic",
    }
);

wire_enum!(
    Metric, "metric" {
        Returns => "returns",
        Volatility => "volatility",
        Sharpe => "sharpe",
    }
);

/// Upper-cased ticker symbol such as `AAPL`, `BRK.B` or `^GSPC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    const MAX_LEN: usize = 12;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, String> {
        let symbol = raw.trim().to_ascii_uppercase();

        if symbol.is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if symbol.len() > Self::MAX_LEN
            || !symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        {
            return Err(format!("'{}' is not a ticker symbol", raw));
        }

        Ok(Symbol(symbol))
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, String> {
        raw.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> String {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn price_period() -> Period {
    Period::OneMonth
}

fn daily() -> Interval {
    Interval::OneDay
}

fn indicator_period() -> Period {
    Period::ThreeMonths
}

fn pattern_period() -> Period {
    Period::SixMonths
}

fn comparison_period() -> Period {
    Period::OneYear
}

fn income() -> StatementType {
    StatementType::Income
}

fn all_metrics() -> Vec<Metric> {
    Metric::ALL.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceParams {
    pub symbol: Symbol,
    #[serde(default = "price_period")]
    pub period: Period,
    #[serde(default = "daily")]
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FundamentalsParams {
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinancialsParams {
    pub symbol: Symbol,
    #[serde(default = "income")]
    pub statement_type: StatementType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorParams {
    pub symbol: Symbol,
    pub indicators: Vec<Indicator>,
    #[serde(default = "indicator_period")]
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternParams {
    pub symbol: Symbol,
    #[serde(default = "pattern_period")]
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareParams {
    pub symbols: Vec<Symbol>,
    #[serde(default = "comparison_period")]
    pub period: Period,
    #[serde(default = "all_metrics")]
    pub metrics: Vec<Metric>,
}

/// A validated call to one of the built-in tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolRequest {
    Price(PriceParams),
    Fundamentals(FundamentalsParams),
    Financials(FinancialsParams),
    Indicators(IndicatorParams),
    Patterns(PatternParams),
    Compare(CompareParams),
}

impl ToolRequest {
    pub fn parse(kind: ToolKind, parameters: Value) -> Result<Self> {
        let tool = kind.spec().id;
        let invalid = |message: String| AgentError::ParameterValidation {
            tool: tool.to_string(),
            message,
        };

        let request = match kind {
            ToolKind::StockAnalyzer => serde_json::from_value(parameters).map(ToolRequest::Price),
            ToolKind::FundamentalAnalyzer => {
                serde_json::from_value(parameters).map(ToolRequest::Fundamentals)
            }
            ToolKind::FinancialStatements => {
                serde_json::from_value(parameters).map(ToolRequest::Financials)
            }
            ToolKind::TechnicalIndicators => {
                serde_json::from_value(parameters).map(ToolRequest::Indicators)
            }
            ToolKind::PatternAnalyzer => serde_json::from_value(parameters).map(ToolRequest::Patterns),
            ToolKind::StockComparer => serde_json::from_value(parameters).map(ToolRequest::Compare),
        }
        .map_err(|e| invalid(e.to_string()))?;

        let missing = match &request {
            ToolRequest::Indicators(params) if params.indicators.is_empty() => Some("indicator"),
            ToolRequest::Compare(params) if params.symbols.is_empty() => Some("symbol"),
            ToolRequest::Compare(params) if params.metrics.is_empty() => Some("metric"),
            _ => None,
        };

        match missing {
            Some(what) => Err(invalid(format!("at least one {} is required", what))),
            None => Ok(request),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolRequest::Price(_) => ToolKind::StockAnalyzer,
            ToolRequest::Fundamentals(_) => ToolKind::FundamentalAnalyzer,
            ToolRequest::Financials(_) => ToolKind::FinancialStatements,
            ToolRequest::Indicators(_) => ToolKind::TechnicalIndicators,
            ToolRequest::Patterns(_) => ToolKind::PatternAnalyzer,
            ToolRequest::Compare(_) => ToolKind::StockComparer,
        }
    }

    /// Parameters as sent over the wire, defaults filled in.
    pub fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_filled_and_symbol_uppercased() {
        let request = ToolRequest::parse(ToolKind::StockAnalyzer, json!({"symbol": " aapl "})).unwrap();

        assert_eq!(
            request.to_params().unwrap(),
            json!({"symbol": "AAPL", "period": "1mo", "interval": "1d"})
        );
    }

    #[test]
    fn test_enumerated_values_are_case_insensitive() {
        let request = ToolRequest::parse(
            ToolKind::TechnicalIndicators,
            json!({"symbol": "TSLA", "indicators": ["RSI", "macd"], "period": "6MO"}),
        )
        .unwrap();

        match request {
            ToolRequest::Indicators(params) => {
                assert_eq!(params.indicators, vec![Indicator::Rsi, Indicator::Macd]);
                assert_eq!(params.period, Period::SixMonths);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_unknown_keys_are_rejected_not_renamed() {
        let err = ToolRequest::parse(
            ToolKind::PatternAnalyzer,
            json!({"symbol": "MSFT", "time_period": "1y"}),
        )
        .unwrap_err();

        match err {
            AgentError::ParameterValidation { tool, message } => {
                assert_eq!(tool, "technical.analyze_patterns");
                assert!(message.contains("time_period"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            (ToolKind::FundamentalAnalyzer, json!({})),
            (ToolKind::FundamentalAnalyzer, json!({"symbol": ""})),
            (ToolKind::FundamentalAnalyzer, json!({"symbol": "$step_0"})),
            (ToolKind::StockAnalyzer, json!({"symbol": "AAPL", "period": "2mo"})),
            (ToolKind::FinancialStatements, json!({"symbol": "AAPL", "statement_type": "equity"})),
            (ToolKind::TechnicalIndicators, json!({"symbol": "AAPL", "indicators": []})),
            (ToolKind::StockComparer, json!({"symbols": []})),
            (ToolKind::StockComparer, json!({"symbol": "AAPL"})),
        ];

        for (kind, params) in cases {
            let result = ToolRequest::parse(kind, params.clone());
            assert!(
                matches!(result, Err(AgentError::ParameterValidation { .. })),
                "{:?} {}",
                kind,
                params
            );
        }
    }

    #[test]
    fn test_comparison_defaults() {
        let request =
            ToolRequest::parse(ToolKind::StockComparer, json!({"symbols": ["aapl", "msft"]})).unwrap();

        assert_eq!(request.kind(), ToolKind::StockComparer);
        assert_eq!(
            request.to_params().unwrap(),
            json!({
                "symbols": ["AAPL", "MSFT"],
                "period": "1y",
                "metrics": ["returns", "volatility", "sharpe"]
            })
        );
    }

    #[test]
    fn test_symbol_forms() {
        for ok in ["brk.b", "^GSPC", "GC=F", "BTC-USD"] {
            assert!(ok.parse::<Symbol>().is_ok(), "{}", ok);
        }
        assert!("APPLE INC".parse::<Symbol>().is_err());
    }
}
