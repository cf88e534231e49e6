//! Built-in tool manifest
//!
//! Static metadata for every remote analysis tool: the registry key used in
//! intents, the `<server>.<method>` tool id used in plans, and the text that
//! goes into planning prompts.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    StockAnalyzer,
    FundamentalAnalyzer,
    FinancialStatements,
    TechnicalIndicators,
    PatternAnalyzer,
    StockComparer,
}

/// Which MCP server hosts a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolServer {
    StockData,
    Technical,
}

impl ToolServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolServer::StockData => "stock_data",
            ToolServer::Technical => "technical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    MarketData,
    FundamentalData,
    TechnicalAnalysis,
    Comparison,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub kind: ToolKind,
    /// Registry key, e.g. `stock_analyzer`.
    pub key: &'static str,
    /// Plan-level identifier, `<server>.<method>`.
    pub id: &'static str,
    pub server: ToolServer,
    /// JSON-RPC method name on the server.
    pub method: &'static str,
    pub description: &'static str,
    pub when_to_use: &'static str,
    pub examples: &'static [&'static str],
    /// Parameter shape shown to the planner.
    pub parameters: &'static str,
    pub category: ToolCategory,
}

pub static BUILTIN_TOOLS: [ToolSpec; 6] = [
    ToolSpec {
        kind: ToolKind::StockAnalyzer,
        key: "stock_analyzer",
        id: "stock_data.get_price",
        server: ToolServer::StockData,
        method: "get_price",
        description: "Analyzes stock prices, historical data, and volume trends",
        when_to_use: "User asks about stock prices, price history, volume, or wants to see price charts",
        examples: &[
            "What's Apple's stock price?",
            "Show me TSLA price for last month",
            "How has MSFT performed this year?",
            "What's the trading volume for GOOGL?",
        ],
        parameters: r#"{"symbol": "AAPL", "period": "1mo", "interval": "1d"}"#,
        category: ToolCategory::MarketData,
    },
    ToolSpec {
        kind: ToolKind::FundamentalAnalyzer,
        key: "fundamental_analyzer",
        id: "stock_data.get_fundamentals",
        server: ToolServer::StockData,
        method: "get_fundamentals",
        description: "Provides company fundamentals like PE ratio, market cap, earnings, and key metrics",
        when_to_use: "User asks about company valuation, earnings, fundamentals, or financial health",
        examples: &[
            "What's Apple's PE ratio?",
            "Show me Tesla's earnings",
            "Is Microsoft overvalued?",
            "What's Amazon's market cap?",
        ],
        parameters: r#"{"symbol": "AAPL"}"#,
        category: ToolCategory::FundamentalData,
    },
    ToolSpec {
        kind: ToolKind::FinancialStatements,
        key: "financial_statements",
        id: "stock_data.get_financials",
        server: ToolServer::StockData,
        method: "get_financials",
        description: "Retrieves detailed financial statements including income, balance sheet, and cash flow",
        when_to_use: "User asks for detailed financials, revenue, expenses, assets, or cash flow",
        examples: &[
            "Show me Apple's income statement",
            "What's Tesla's revenue growth?",
            "How much debt does Microsoft have?",
            "What's Amazon's cash flow?",
        ],
        parameters: r#"{"symbol": "AAPL", "statement_type": "income|balance|cashflow"}"#,
        category: ToolCategory::FundamentalData,
    },
    ToolSpec {
        kind: ToolKind::TechnicalIndicators,
        key: "technical_indicators",
        id: "technical.calculate_indicators",
        server: ToolServer::Technical,
        method: "calculate_indicators",
        description: "Calculates technical indicators like moving averages, RSI, MACD, and more",
        when_to_use: "User asks about technical analysis, indicators, or trading signals",
        examples: &[
            "Calculate RSI for AAPL",
            "What's the 50-day moving average for TSLA?",
            "Show me MACD for Microsoft",
            "Is Google oversold?",
        ],
        parameters: r#"{"symbol": "AAPL", "indicators": ["sma", "ema", "rsi", "macd", "bollinger", "stochastic"], "period": "3mo"}"#,
        category: ToolCategory::TechnicalAnalysis,
    },
    ToolSpec {
        kind: ToolKind::PatternAnalyzer,
        key: "pattern_analyzer",
        id: "technical.analyze_patterns",
        server: ToolServer::Technical,
        method: "analyze_patterns",
        description: "Identifies chart patterns, support/resistance levels, and trend analysis",
        when_to_use: "User asks about chart patterns, trends, support levels, or technical setups",
        examples: &[
            "What patterns do you see in AAPL chart?",
            "Where is support for Tesla?",
            "Is Microsoft in an uptrend?",
            "Any breakout patterns in GOOGL?",
        ],
        parameters: r#"{"symbol": "AAPL", "period": "6mo"}"#,
        category: ToolCategory::TechnicalAnalysis,
    },
    ToolSpec {
        kind: ToolKind::StockComparer,
        key: "stock_comparer",
        id: "technical.compare_performance",
        server: ToolServer::Technical,
        method: "compare_performance",
        description: "Compares performance metrics between multiple stocks",
        when_to_use: "User wants to compare stocks, see relative performance, or analyze correlations",
        examples: &[
            "Compare Apple vs Microsoft",
            "Which performed better: TSLA or RIVN?",
            "Show correlation between tech stocks",
            "Compare FAANG stocks performance",
        ],
        parameters: r#"{"symbols": ["AAPL", "MSFT"], "period": "1y", "metrics": ["returns", "volatility", "sharpe"]}"#,
        category: ToolCategory::Comparison,
    },
];

impl ToolKind {
    pub fn spec(&self) -> &'static ToolSpec {
        match self {
            ToolKind::StockAnalyzer => &BUILTIN_TOOLS[0],
            ToolKind::FundamentalAnalyzer => &BUILTIN_TOOLS[1],
            ToolKind::FinancialStatements => &BUILTIN_TOOLS[2],
            ToolKind::TechnicalIndicators => &BUILTIN_TOOLS[3],
            ToolKind::PatternAnalyzer => &BUILTIN_TOOLS[4],
            ToolKind::StockComparer => &BUILTIN_TOOLS[5],
        }
    }

    /// Whether the tool takes a list of symbols rather than a single one.
    pub fn is_multi_symbol(&self) -> bool {
        matches!(self, ToolKind::StockComparer)
    }
}

/// Look a tool up by tool id or registry key.
pub fn find_spec(name: &str) -> Option<&'static ToolSpec> {
    BUILTIN_TOOLS
        .iter()
        .find(|spec| spec.id == name || spec.key == name)
}
