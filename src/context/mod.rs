//! Conversation context
//!
//! Tracks what a conversation has been about (entities, tools, periods) so
//! follow-up queries can be resolved and plans can reference earlier results
//! through `$context.<key>` placeholders.

use crate::execution::ExecutionReport;
use crate::intent::{self, Intent, IntentAnalysis};
use crate::models::{ExecutionPlan, ExecutionStatus};
use crate::tools::find_spec;
use crate::tools::params::Period;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};

const MAX_MESSAGES: usize = 50;
const MAX_RECENT_ENTITIES: usize = 10;
const MAX_TOOL_SEQUENCE: usize = 20;
const RESULT_CACHE_MINUTES: i64 = 10;

/// Tools that naturally follow each other in an analysis session.
const TOOL_FLOW: &[(&str, &[&str])] = &[
    ("stock_analyzer", &["fundamental_analyzer", "technical_indicators"]),
    ("fundamental_analyzer", &["financial_statements", "stock_comparer"]),
    ("technical_indicators", &["pattern_analyzer", "stock_analyzer"]),
    ("pattern_analyzer", &["technical_indicators", "stock_comparer"]),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub query: String,
    /// First 16 hex chars of the query's SHA-256.
    pub query_hash: String,
    pub intent: Intent,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub failed_steps: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTracking {
    pub last_entity: Option<String>,
    pub recent_entities: VecDeque<String>,
    pub entity_history: BTreeMap<String, EntityRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    pub value: Value,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolTracking {
    pub last_tool: Option<String>,
    /// Registry keys, oldest first.
    pub tool_sequence: VecDeque<String>,
    /// Latest successful output per tool id.
    pub tool_results: BTreeMap<String, CachedResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub topic: Option<String>,
    pub intent_flow: Vec<Intent>,
    pub time_context: Option<Period>,
    pub comparison_context: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub interaction_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub messages: VecDeque<ContextMessage>,
    pub entities: EntityTracking,
    pub tools: ToolTracking,
    pub conversation: ConversationState,
    pub metadata: ContextMetadata,
}

/// What the conversation suggests about an incoming query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextHints {
    /// Query reads as a follow-up ("what about ...").
    pub follow_up: bool,
    pub last_entity: Option<String>,
    pub suggested_tools: Vec<String>,
    pub time_modifier: Option<Period>,
    /// Most recent first.
    pub comparison_entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub tool: String,
    pub reason: String,
    pub entity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub last_entity: Option<String>,
    pub recent_entities: Vec<String>,
    pub last_tool: Option<String>,
    pub recent_tools: Vec<String>,
    pub topic: Option<String>,
    pub interaction_count: u64,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            messages: VecDeque::new(),
            entities: EntityTracking::default(),
            tools: ToolTracking::default(),
            conversation: ConversationState::default(),
            metadata: ContextMetadata {
                created_at: now,
                last_updated: now,
                interaction_count: 0,
            },
        }
    }

    /// Record a query that was answered without running tools.
    pub fn record_query(&mut self, query: &str, intent: &IntentAnalysis) {
        self.push_message(query, intent, Vec::new(), 0);
    }

    /// Record a query together with the plan that answered it.
    pub fn record_execution(
        &mut self,
        query: &str,
        intent: &IntentAnalysis,
        plan: &ExecutionPlan,
        report: &ExecutionReport,
    ) {
        let now = Utc::now();

        let tools_used: Vec<String> = plan
            .tool_ids()
            .iter()
            .map(|id| registry_key(id))
            .collect();
        self.push_message(query, intent, tools_used, report.failed_steps());

        for symbol in &intent.entities.symbols {
            self.track_entity("stock", symbol, now);
        }

        for observation in &report.observations {
            if observation.status != ExecutionStatus::Success {
                continue;
            }
            let key = registry_key(&observation.tool_id);
            self.tools.last_tool = Some(key.clone());
            self.tools.tool_sequence.push_back(key);
            while self.tools.tool_sequence.len() > MAX_TOOL_SEQUENCE {
                self.tools.tool_sequence.pop_front();
            }
        }

        for (tool_id, value) in report.named_results(plan) {
            self.tools.tool_results.insert(
                tool_id,
                CachedResult {
                    value,
                    cached_at: now,
                },
            );
        }
        self.prune_cache(now);

        if intent.intent != Intent::Unknown {
            self.conversation.topic = Some(intent.intent.as_str().to_string());
        }
        if let Some(period) = intent.entities.time_period {
            self.conversation.time_context = Some(period);
        }
        if intent.intent == Intent::CompareStocks {
            self.conversation.comparison_context = intent.entities.symbols.clone();
        }
    }

    fn push_message(&mut self, query: &str, intent: &IntentAnalysis, tools_used: Vec<String>, failed_steps: usize) {
        let now = Utc::now();

        self.messages.push_back(ContextMessage {
            query: query.to_string(),
            query_hash: hash_message(query),
            intent: intent.intent,
            symbols: intent.entities.symbols.clone(),
            tools_used,
            failed_steps,
            timestamp: now,
        });
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }

        self.conversation.intent_flow.push(intent.intent);
        if self.conversation.intent_flow.len() > MAX_MESSAGES {
            self.conversation.intent_flow.remove(0);
        }
        self.metadata.last_updated = now;
        self.metadata.interaction_count += 1;
    }

    fn track_entity(&mut self, kind: &str, entity: &str, now: DateTime<Utc>) {
        self.entities.last_entity = Some(entity.to_string());

        self.entities.recent_entities.retain(|e| e != entity);
        self.entities.recent_entities.push_back(entity.to_string());
        while self.entities.recent_entities.len() > MAX_RECENT_ENTITIES {
            self.entities.recent_entities.pop_front();
        }

        let record = self
            .entities
            .entity_history
            .entry(entity.to_string())
            .or_insert_with(|| EntityRecord {
                kind: kind.to_string(),
                first_seen: now,
                last_seen: now,
                count: 0,
            });
        record.count += 1;
        record.last_seen = now;
    }

    fn prune_cache(&mut self, now: DateTime<Utc>) {
        let max_age = Duration::minutes(RESULT_CACHE_MINUTES);
        self.tools
            .tool_results
            .retain(|_, cached| now - cached.cached_at <= max_age);
    }

    pub fn hints(&self, query: &str) -> ContextHints {
        let follow_up = intent::is_follow_up(query);

        let suggested_tools = match (&self.tools.last_tool, follow_up) {
            (Some(tool), true) => vec![tool.clone()],
            _ => Vec::new(),
        };

        let comparison_entities = if intent::is_comparison(query) && self.entities.recent_entities.len() >= 2 {
            self.entities.recent_entities.iter().rev().take(2).cloned().collect()
        } else {
            Vec::new()
        };

        ContextHints {
            follow_up,
            last_entity: self.entities.last_entity.clone(),
            suggested_tools,
            time_modifier: intent::extract_time_period(query),
            comparison_entities,
        }
    }

    /// Up to two complementary analyses not among the last three tools used.
    pub fn suggest_next_analysis(&self) -> Vec<Suggestion> {
        let (Some(last_tool), Some(entity)) = (&self.tools.last_tool, &self.entities.last_entity) else {
            return Vec::new();
        };

        let recent: Vec<&String> = self.tools.tool_sequence.iter().rev().take(3).collect();

        TOOL_FLOW
            .iter()
            .find(|(tool, _)| *tool == last_tool.as_str())
            .map(|(_, next)| *next)
            .unwrap_or(&[])
            .iter()
            .filter(|next| !recent.iter().any(|r| r.as_str() == **next))
            .take(2)
            .map(|next| Suggestion {
                tool: next.to_string(),
                reason: format!("Natural follow-up to {}", last_tool),
                entity: entity.clone(),
            })
            .collect()
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            last_entity: self.entities.last_entity.clone(),
            recent_entities: last_n(&self.entities.recent_entities, 5),
            last_tool: self.tools.last_tool.clone(),
            recent_tools: last_n(&self.tools.tool_sequence, 5),
            topic: self.conversation.topic.clone(),
            interaction_count: self.metadata.interaction_count,
        }
    }

    /// Short digest of the last three exchanges for LLM prompts.
    pub fn prompt_summary(&self) -> String {
        if self.messages.is_empty() {
            return "No previous context".to_string();
        }

        self.messages
            .iter()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|message| {
                if message.symbols.is_empty() {
                    format!("Previous query: {}", message.query)
                } else {
                    format!(
                        "Previous query: {} | Previously analyzed: {}",
                        message.query,
                        message.symbols.join(", ")
                    )
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Values addressable from plans as `$context.<key>`.
    pub fn reference_map(&self) -> Map<String, Value> {
        let mut map = Map::new();

        map.insert("conversation_id".to_string(), json!(self.conversation_id));
        map.insert("last_entity".to_string(), json!(self.entities.last_entity));
        map.insert("recent_entities".to_string(), json!(self.entities.recent_entities));
        map.insert("last_tool".to_string(), json!(self.tools.last_tool));
        map.insert("topic".to_string(), json!(self.conversation.topic));
        map.insert(
            "time_context".to_string(),
            json!(self.conversation.time_context.map(|p| p.as_str())),
        );
        map.insert(
            "comparison_context".to_string(),
            json!(self.conversation.comparison_context),
        );
        map.insert(
            "interaction_count".to_string(),
            json!(self.metadata.interaction_count),
        );

        for (tool_id, cached) in &self.tools.tool_results {
            map.insert(tool_id.clone(), cached.value.clone());
        }

        map
    }
}

fn registry_key(tool_id: &str) -> String {
    find_spec(tool_id)
        .map(|spec| spec.key.to_string())
        .unwrap_or_else(|| tool_id.to_string())
}

fn last_n(items: &VecDeque<String>, n: usize) -> Vec<String> {
    items.iter().skip(items.len().saturating_sub(n)).cloned().collect()
}

pub fn hash_message(message: &str) -> String {
    let digest = Sha256::digest(message.as_bytes());
    hex::encode(digest)[..16].to_string()
}
