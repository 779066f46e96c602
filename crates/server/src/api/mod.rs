use axum::{
  Json, Router,
  routing::{delete, get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::utils::AppState;

mod compose_context;
mod delete_memory;
mod enqueue_batch;
mod enqueue_conversation;
mod enqueue_memory;
mod task_status;

pub use compose_context::SearchMemory;
pub use delete_memory::DeleteMemoryQuery;
pub use enqueue_batch::{EnqueueBatch, EnqueuedBatch};
pub use enqueue_conversation::{ConversationMessage, EnqueueConversation, EnqueuedConversation};
pub use enqueue_memory::{EnqueueMemory, EnqueuedTask};
pub use task_status::TaskStatusResponse;

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Mnemo API",
    version = "0.0.1",
    description = "Cognitive memory engine: vector + graph + relational memory for AI agents"
  ),
  paths(
    enqueue_memory::add_memory,
    enqueue_memory::update_memory,
    enqueue_memory::forget_memory,
    enqueue_batch::batch_add_memory,
    enqueue_conversation::add_conversation,
    compose_context::search_memory,
    delete_memory::delete_memory,
    task_status::task_status
  ),
  components(schemas(
    EnqueueMemory,
    EnqueuedTask,
    EnqueueBatch,
    EnqueuedBatch,
    EnqueueConversation,
    ConversationMessage,
    EnqueuedConversation,
    SearchMemory,
    TaskStatusResponse,
    mnemo_core::ContextResult,
    mnemo_core::MemoryItem,
    mnemo_core::DeleteOutcome,
    mnemo_shared::MessageRole,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn app() -> Router<AppState> {
  Router::new()
    .route(
      "/api/v0/memories",
      post(enqueue_memory::add_memory).put(enqueue_memory::update_memory),
    )
    .route("/api/v0/memories/forget", post(enqueue_memory::forget_memory))
    .route("/api/v0/memories/batch", post(enqueue_batch::batch_add_memory))
    .route(
      "/api/v0/conversations",
      post(enqueue_conversation::add_conversation),
    )
    .route("/api/v0/memories/search", post(compose_context::search_memory))
    .route(
      "/api/v0/memories/{vector_id}",
      delete(delete_memory::delete_memory),
    )
    .route("/api/v0/tasks/{task_id}", get(task_status::task_status))
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
}
