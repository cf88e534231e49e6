//! Agent orchestrator
//!
//! CONTEXT → INTENT → PLAN → EXECUTE → RECORD → FORMAT
//!
//! Plan-level failures become an error response; step failures are part of
//! the results and are reported in the formatted answer.

pub mod format;

use crate::config::Settings;
use crate::context::ConversationContext;
use crate::execution::{ExecutionReport, ExecutorConfig, PlanExecutor};
use crate::intent::IntentAnalysis;
use crate::llm::{chunked, CompletionOptions, GeminiClient, LlmClient};
use crate::models::{AgentResponse, ExecutionPlan, ResponseMetadata, StreamChunk};
use crate::planner::{LlmPlanner, Planner, RuleBasedPlanner};
use crate::state::{build_store, ContextStore};
use crate::tools::ToolCatalog;
use crate::Result;
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const FORMAT_TEMPERATURE: f32 = 0.7;
const STREAM_CHUNK_CHARS: usize = 50;

pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = StreamChunk> + Send + 'a>>;

pub struct Agent {
    planner: Arc<dyn Planner>,
    catalog: Arc<ToolCatalog>,
    executor: PlanExecutor,
    llm: Option<Arc<dyn LlmClient>>,
    store: Arc<dyn ContextStore>,
}

impl Agent {
    pub fn new(planner: Arc<dyn Planner>, catalog: Arc<ToolCatalog>, store: Arc<dyn ContextStore>) -> Self {
        let executor = PlanExecutor::new(catalog.clone());
        Self {
            planner,
            catalog,
            executor,
            llm: None,
            store,
        }
    }

    /// LLM used to turn results into prose. Without one, results are rendered
    /// deterministically.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = PlanExecutor::with_config(self.catalog.clone(), config);
        self
    }

    /// Wire the agent from settings: MCP tool servers, Gemini when a key is
    /// configured, and the Postgres or in-memory context store.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let catalog = Arc::new(ToolCatalog::from_settings(settings)?);
        let store = build_store(settings);
        let executor_config = ExecutorConfig::from_settings(settings);

        let agent = match settings.gemini_api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(key, settings.gemini_model.clone())?);
                info!(model = %settings.gemini_model, "Agent using Gemini planner");
                Agent::new(Arc::new(LlmPlanner::new(llm.clone())), catalog, store).with_llm(llm)
            }
            None => {
                warn!("GEMINI_API_KEY not set, using rule-based planner without LLM formatting");
                Agent::new(Arc::new(RuleBasedPlanner::new()), catalog, store)
            }
        };

        Ok(agent.with_executor_config(executor_config))
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<()> {
        self.store.clear(conversation_id).await
    }

    /// Answer one query. Never fails: errors become an error response.
    pub async fn process_request(&self, query: &str, conversation_id: &str) -> AgentResponse {
        match self.try_process(query, conversation_id).await {
            Ok(response) => response,
            Err(e) => {
                error!(conversation_id, error = %e, "Error processing request");
                AgentResponse::failure(&e)
            }
        }
    }

    async fn try_process(&self, query: &str, conversation_id: &str) -> Result<AgentResponse> {
        let mut context = self.load_context(conversation_id).await;
        let intent = self.planner.analyze_intent(query, &context).await?;

        info!(
            conversation_id,
            intent = intent.intent.as_str(),
            confidence = intent.confidence,
            "Intent analyzed"
        );

        if !intent.needs_tools() {
            context.record_query(query, &intent);
            self.save_context(&context).await;

            return Ok(AgentResponse {
                response: format::no_tools_response(intent.intent).to_string(),
                metadata: Some(metadata(&intent, &ExecutionPlan::default(), &ExecutionReport::default())),
                error: false,
            });
        }

        let (plan, report) = self.plan_and_run(query, &intent, &context).await?;

        context.record_execution(query, &intent, &plan, &report);
        self.save_context(&context).await;

        let response = self.format_response(query, &intent, &plan, &report).await;

        Ok(AgentResponse {
            response,
            metadata: Some(metadata(&intent, &plan, &report)),
            error: false,
        })
    }

    /// Same pipeline as [`Agent::process_request`], reported as status,
    /// content and metadata chunks.
    pub fn process_request_stream<'a>(&'a self, query: &'a str, conversation_id: &'a str) -> ChunkStream<'a> {
        let stream = async_stream::stream! {
            yield status("Analyzing your query...");

            let mut context = self.load_context(conversation_id).await;
            let intent = match self.planner.analyze_intent(query, &context).await {
                Ok(intent) => intent,
                Err(e) => {
                    error!(conversation_id, error = %e, "Intent analysis failed");
                    yield StreamChunk::Error { message: e.to_string() };
                    return;
                }
            };

            if !intent.needs_tools() {
                context.record_query(query, &intent);
                self.save_context(&context).await;

                let mut pieces = chunked(format::no_tools_response(intent.intent), STREAM_CHUNK_CHARS);
                while let Some(Ok(chunk)) = pieces.next().await {
                    yield StreamChunk::Content { chunk };
                }
                yield metadata_chunk(&intent, &ExecutionPlan::default(), &ExecutionReport::default());
                return;
            }

            yield status("Creating execution plan...");
            let plan = match self.planner.create_plan(query, &intent, &self.catalog).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(conversation_id, error = %e, "Planning failed");
                    yield StreamChunk::Error { message: e.to_string() };
                    return;
                }
            };

            yield status("Executing analysis...");
            let report = match self.executor.run(&plan, &context.reference_map()).await {
                Ok(report) => report,
                Err(e) => {
                    error!(conversation_id, error = %e, "Plan execution failed");
                    yield StreamChunk::Error { message: e.to_string() };
                    return;
                }
            };

            context.record_execution(query, &intent, &plan, &report);
            self.save_context(&context).await;

            yield status("Formatting response...");

            let mut streamed_any = false;
            if let Some(llm) = &self.llm {
                let prompt = format::format_prompt(query, &intent, &report);
                match llm.complete_stream(&prompt, &CompletionOptions::text(FORMAT_TEMPERATURE)).await {
                    Ok(mut pieces) => {
                        while let Some(piece) = pieces.next().await {
                            match piece {
                                Ok(chunk) => {
                                    streamed_any = true;
                                    yield StreamChunk::Content { chunk };
                                }
                                Err(e) => {
                                    warn!(error = %e, "LLM stream interrupted");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "LLM formatting failed, rendering results directly"),
                }
            }

            if !streamed_any {
                let text = format::render_results(&plan, &report);
                let mut pieces = chunked(&text, STREAM_CHUNK_CHARS);
                while let Some(Ok(chunk)) = pieces.next().await {
                    yield StreamChunk::Content { chunk };
                }
            }

            yield metadata_chunk(&intent, &plan, &report);
        };

        Box::pin(stream)
    }

    async fn plan_and_run(
        &self,
        query: &str,
        intent: &IntentAnalysis,
        context: &ConversationContext,
    ) -> Result<(ExecutionPlan, ExecutionReport)> {
        let plan = self.planner.create_plan(query, intent, &self.catalog).await?;
        debug!(steps = plan.len(), tools = ?plan.tool_ids(), "Plan created");

        let started = Instant::now();
        let report = self.executor.run(&plan, &context.reference_map()).await?;

        info!(
            steps = plan.len(),
            succeeded = report.succeeded_steps(),
            failed = report.failed_steps(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Plan executed"
        );

        Ok((plan, report))
    }

    async fn format_response(
        &self,
        query: &str,
        intent: &IntentAnalysis,
        plan: &ExecutionPlan,
        report: &ExecutionReport,
    ) -> String {
        if let Some(llm) = &self.llm {
            let prompt = format::format_prompt(query, intent, report);
            match llm.complete(&prompt, &CompletionOptions::text(FORMAT_TEMPERATURE)).await {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => warn!("LLM returned an empty answer, rendering results directly"),
                Err(e) => warn!(error = %e, "LLM formatting failed, rendering results directly"),
            }
        }

        format::render_results(plan, report)
    }

    async fn load_context(&self, conversation_id: &str) -> ConversationContext {
        match self.store.get(conversation_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(conversation_id, error = %e, "Failed to load context, starting fresh");
                ConversationContext::new(conversation_id)
            }
        }
    }

    async fn save_context(&self, context: &ConversationContext) {
        if let Err(e) = self.store.save(context).await {
            warn!(conversation_id = %context.conversation_id, error = %e, "Failed to save context");
        }
    }
}

fn status(message: &str) -> StreamChunk {
    StreamChunk::Status {
        message: message.to_string(),
    }
}

fn metadata(intent: &IntentAnalysis, plan: &ExecutionPlan, report: &ExecutionReport) -> ResponseMetadata {
    ResponseMetadata {
        intent: intent.intent.as_str().to_string(),
        confidence: intent.confidence,
        tools_used: plan.tool_ids(),
        steps: plan.len(),
        failed_steps: report.failed_steps(),
        execution_time: Utc::now().to_rfc3339(),
    }
}

fn metadata_chunk(intent: &IntentAnalysis, plan: &ExecutionPlan, report: &ExecutionReport) -> StreamChunk {
    let metadata = serde_json::to_value(metadata(intent, plan, report)).unwrap_or_default();
    StreamChunk::Metadata { metadata }
}
