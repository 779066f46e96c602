mod embedder;
pub use embedder::{Embedder, GatewayEmbedder};

mod engine;
pub use engine::{AddMemoryOutcome, BatchItemFailure, BatchOutcome, MemoryEngine, ProdEngine};

mod extraction;
pub use extraction::{
  ExtractedGraph, FactCategory, FactDraft, FactImportance, GraphExtractor, LlmGraphExtractor,
  OWNER_SENTINEL, extract_facts, extract_json_slice, parse_extracted_graph, parse_fact_drafts,
  substitute_owner,
};

mod judgment;
pub use judgment::{
  CandidateMemory, JUDGE_SCORE_FLOOR, JUDGE_TOP_K, JudgmentOutcome, Operation, ParsedJudgment,
  build_judgment_prompt, judge, parse_operations,
};

mod executor;
pub use executor::{
  DeleteOutcome, ExecutedItem, ExecutionStats, ExecutionSummary, GraphDiff, diff_graphs,
};

mod prestage;
pub use prestage::{
  PreparedContent, REDACTION_SENTINEL, flatten_transcript, prepare_conversation_content,
};

mod retrieval;
pub use retrieval::{ContextResult, MemoryItem};

#[cfg(test)]
pub(crate) mod fakes;
