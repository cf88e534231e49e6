//! Intent analysis
//!
//! Deterministic keyword and entity extraction for financial queries. The LLM
//! planner uses this as its fallback and to sanity-check model output.

use crate::context::ContextHints;
use crate::tools::params::{Indicator, Period};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    AnalyzeStock,
    CompareStocks,
    TechnicalAnalysis,
    FundamentalAnalysis,
    MarketOverview,
    Greeting,
    Help,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AnalyzeStock => "analyze_stock",
            Intent::CompareStocks => "compare_stocks",
            Intent::TechnicalAnalysis => "technical_analysis",
            Intent::FundamentalAnalysis => "fundamental_analysis",
            Intent::MarketOverview => "market_overview",
            Intent::Greeting => "greeting",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }

    /// Lenient parse used for model output; anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analyze_stock" => Intent::AnalyzeStock,
            "compare_stocks" => Intent::CompareStocks,
            "technical_analysis" => Intent::TechnicalAnalysis,
            "fundamental_analysis" => Intent::FundamentalAnalysis,
            "market_overview" => Intent::MarketOverview,
            "greeting" => Intent::Greeting,
            "help" => Intent::Help,
            _ => Intent::Unknown,
        }
    }

    /// Registry keys of the tools this intent needs.
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            Intent::AnalyzeStock => &["stock_analyzer", "fundamental_analyzer", "technical_indicators"],
            Intent::CompareStocks => &["stock_comparer", "fundamental_analyzer"],
            Intent::TechnicalAnalysis => &["stock_analyzer", "technical_indicators", "pattern_analyzer"],
            Intent::FundamentalAnalysis => &["fundamental_analyzer", "financial_statements"],
            Intent::MarketOverview => &["stock_analyzer"],
            Intent::Greeting | Intent::Help | Intent::Unknown => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockEntities {
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub time_period: Option<Period>,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub entities: StockEntities,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub reasoning: String,
    pub required_tools: Vec<String>,
}

impl IntentAnalysis {
    pub fn new(intent: Intent, entities: StockEntities, confidence: f32, reasoning: impl Into<String>) -> Self {
        let mut required_tools: Vec<String> =
            intent.required_tools().iter().map(|t| t.to_string()).collect();

        if !entities.indicators.is_empty() && !intent.required_tools().is_empty() {
            add_unique(&mut required_tools, "technical_indicators");
        }

        Self {
            intent,
            entities,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            required_tools,
        }
    }

    pub fn needs_tools(&self) -> bool {
        !self.required_tools.is_empty()
    }

    /// Fill gaps from the conversation: missing symbols, comparison partners
    /// and time periods.
    pub fn apply_hints(&mut self, hints: &ContextHints) {
        if matches!(self.intent, Intent::Greeting | Intent::Help) {
            return;
        }

        if self.entities.symbols.is_empty() {
            if let Some(entity) = &hints.last_entity {
                let follow_up = hints.follow_up || hints.time_modifier.is_some();
                if self.intent != Intent::Unknown || follow_up {
                    self.entities.symbols.push(entity.clone());
                }
            }
        }

        if self.intent == Intent::Unknown && !self.entities.symbols.is_empty() {
            self.intent = Intent::AnalyzeStock;
            self.required_tools = if hints.suggested_tools.is_empty() {
                Intent::AnalyzeStock
                    .required_tools()
                    .iter()
                    .map(|t| t.to_string())
                    .collect()
            } else {
                hints.suggested_tools.clone()
            };
            self.reasoning.push_str("; follow-up on previous entity");
        }

        if self.intent == Intent::CompareStocks {
            for entity in &hints.comparison_entities {
                if self.entities.symbols.len() >= 2 {
                    break;
                }
                if !self.entities.symbols.contains(entity) {
                    self.entities.symbols.push(entity.clone());
                }
            }
        }

        if self.entities.time_period.is_none() {
            self.entities.time_period = hints.time_modifier;
        }
    }
}

/// Words that look like tickers but are not.
const STOP_WORDS: &[&str] = &[
    "A", "I", "AI", "AM", "AN", "AND", "ARE", "AS", "AT", "BE", "BUY", "BY", "CEO", "CFO", "DO",
    "EMA", "EPS", "ETF", "FOR", "GDP", "HOW", "IF", "IN", "IPO", "IS", "IT", "ITS", "MACD", "ME",
    "MY", "NO", "NOW", "OF", "OK", "ON", "OR", "PE", "RSI", "SELL", "SMA", "SO", "THE", "TO",
    "UP", "US", "USA", "USD", "VS", "WHAT", "WHY", "YTD",
];

const COMPANY_NAMES: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("meta", "META"),
    ("facebook", "META"),
    ("nvidia", "NVDA"),
    ("netflix", "NFLX"),
    ("intel", "INTC"),
    ("rivian", "RIVN"),
    ("berkshire", "BRK-B"),
    ("s&p", "SPY"),
];

const COMPARE_WORDS: &[&str] = &["compare", "comparison", "versus", "vs", "against"];
const TECHNICAL_WORDS: &[&str] = &[
    "technical", "rsi", "macd", "bollinger", "stochastic", "sma", "ema", "moving average",
    "pattern", "patterns", "support", "resistance", "trend", "breakout", "oversold", "overbought",
];
const FUNDAMENTAL_WORDS: &[&str] = &[
    "fundamental", "fundamentals", "earnings", "revenue", "pe ratio", "p/e", "valuation",
    "market cap", "balance sheet", "cash flow", "income statement", "overvalued", "undervalued",
    "debt",
];
const GREETING_WORDS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon", "good evening"];
const HELP_PHRASES: &[&str] = &[
    "help", "what can you do", "how do you work", "what do you do", "capabilities",
];
const MARKET_WORDS: &[&str] = &["market", "markets", "index", "indices", "s&p", "dow", "nasdaq"];

const FOLLOW_UP_PHRASES: &[&str] = &["what about", "how about", "and for", "same for"];

/// Lower-cased words padded with spaces so phrase checks respect word edges.
struct Normalized(String);

impl Normalized {
    fn new(query: &str) -> Self {
        let words: Vec<String> = query
            .split(|c: char| !(c.is_alphanumeric() || matches!(c, '&' | '/' | '$' | '.' | '-')))
            .map(|w| w.trim_matches('.').to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Normalized(format!(" {} ", words.join(" ")))
    }

    fn has(&self, phrase: &str) -> bool {
        self.0.contains(&format!(" {} ", phrase))
    }

    fn has_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.has(p))
    }

    fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }
}

pub fn is_follow_up(query: &str) -> bool {
    Normalized::new(query).has_any(FOLLOW_UP_PHRASES)
}

pub fn is_comparison(query: &str) -> bool {
    Normalized::new(query).has_any(COMPARE_WORDS)
}

/// Deterministic intent analysis for a single query.
pub fn analyze(query: &str) -> IntentAnalysis {
    let text = Normalized::new(query);
    let symbols = extract_symbols(query);
    let entities = StockEntities {
        symbols: symbols.clone(),
        time_period: extract_time_period(query),
        indicators: extract_indicators(query),
    };

    let (intent, confidence, reasoning) = if symbols.is_empty()
        && text.words().count() <= 4
        && GREETING_WORDS
            .iter()
            .any(|g| text.0.starts_with(&format!(" {} ", g)))
    {
        (Intent::Greeting, 0.9, "greeting")
    } else if symbols.is_empty() && text.has_any(HELP_PHRASES) {
        (Intent::Help, 0.9, "capability question")
    } else if text.has_any(COMPARE_WORDS) {
        (Intent::CompareStocks, 0.7, "comparison keyword")
    } else if text.has_any(TECHNICAL_WORDS) {
        (Intent::TechnicalAnalysis, 0.7, "technical analysis keyword")
    } else if text.has_any(FUNDAMENTAL_WORDS) {
        (Intent::FundamentalAnalysis, 0.7, "fundamental analysis keyword")
    } else if text.has_any(MARKET_WORDS) && symbols.iter().all(|s| s == "SPY") {
        (Intent::MarketOverview, 0.6, "market keyword")
    } else if !symbols.is_empty() {
        (Intent::AnalyzeStock, 0.6, "ticker symbols without a specific focus")
    } else {
        (Intent::Unknown, 0.3, "no recognizable intent")
    };

    let mut analysis = IntentAnalysis::new(
        intent,
        entities,
        confidence,
        format!("Extracted with keyword rules: {}", reasoning),
    );

    if analysis.intent == Intent::MarketOverview && analysis.entities.symbols.is_empty() {
        analysis.entities.symbols.push("SPY".to_string());
    }

    analysis
}

/// Ticker-like tokens (uppercase in the query, or `$`-prefixed) and known
/// company names, deduplicated in order of appearance.
pub fn extract_symbols(query: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();

    for token in query.split(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '$' | '.' | '-' | '&'))) {
        let token = token.trim_matches(|c| c == '.' || c == '-');
        if token.is_empty() {
            continue;
        }

        let candidate = if let Some(tagged) = token.strip_prefix('$') {
            let upper = tagged.to_ascii_uppercase();
            is_ticker_shape(&upper).then_some(upper)
        } else if token.chars().all(|c| c.is_ascii_uppercase()) && is_ticker_shape(token) {
            (!STOP_WORDS.contains(&token)).then(|| token.to_string())
        } else {
            let lower = token.to_ascii_lowercase();
            COMPANY_NAMES
                .iter()
                .find(|(name, _)| *name == lower)
                .map(|(_, ticker)| ticker.to_string())
        };

        if let Some(symbol) = candidate {
            add_unique(&mut symbols, &symbol);
        }
    }

    symbols
}

fn is_ticker_shape(token: &str) -> bool {
    (1..=5).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn extract_time_period(query: &str) -> Option<Period> {
    let text = Normalized::new(query);

    let phrases: &[(&str, Period)] = &[
        ("last year", Period::OneYear),
        ("past year", Period::OneYear),
        ("last month", Period::OneMonth),
        ("past month", Period::OneMonth),
        ("last week", Period::FiveDays),
        ("past week", Period::FiveDays),
        ("this week", Period::FiveDays),
        ("yesterday", Period::OneDay),
        ("today", Period::OneDay),
        ("ytd", Period::YearToDate),
        ("year to date", Period::YearToDate),
        ("this year", Period::YearToDate),
    ];

    if let Some((_, period)) = phrases.iter().find(|(phrase, _)| text.has(phrase)) {
        return Some(*period);
    }

    // "3 months", "5 years", "6-month"
    let words: Vec<&str> = text.words().collect();
    for pair in words.windows(2) {
        let Ok(count) = pair[0].parse::<u32>() else {
            continue;
        };
        let unit = pair[1].trim_end_matches('s');
        let candidate = match unit {
            "month" | "mo" => format!("{}mo", count),
            "year" | "yr" | "y" => format!("{}y", count),
            "day" | "d" => format!("{}d", count),
            _ => continue,
        };
        if let Ok(period) = candidate.parse() {
            return Some(period);
        }
    }

    None
}

pub fn extract_indicators(query: &str) -> Vec<Indicator> {
    let text = Normalized::new(query);
    let mut indicators = Vec::new();

    let exponential = text.has("ema") || text.has("exponential moving average");
    let simple = text.has("sma")
        || text.has("simple moving average")
        || (text.has("moving average") && !text.has("exponential moving average"));

    if simple {
        indicators.push(Indicator::Sma);
    }
    if exponential {
        indicators.push(Indicator::Ema);
    }
    if text.has("rsi") || text.has("relative strength") {
        indicators.push(Indicator::Rsi);
    }
    if text.has("macd") {
        indicators.push(Indicator::Macd);
    }
    if text.has("bollinger") {
        indicators.push(Indicator::Bollinger);
    }
    if text.has("stochastic") {
        indicators.push(Indicator::Stochastic);
    }

    indicators
}

fn add_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
