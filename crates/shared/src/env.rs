use std::env;
use std::sync::LazyLock;

fn required_env(key: &str) -> String {
  env::var(key).expect(&format!("env {key} must be set"))
}

fn env_or(key: &str, default: &str) -> String {
  env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_or_u64(key: &str, default: u64) -> u64 {
  env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default)
}

pub struct AppEnv {
  pub database_url: String,

  pub qdrant_url: String,
  /// Prefix of per-owner vector collections; the owner hash is appended.
  pub collection_prefix: String,

  pub neo4j_uri: String,
  pub neo4j_user: String,
  pub neo4j_password: String,

  pub openai_base_url: String,
  pub openai_api_key: String,
  pub openai_chat_model: String,
  /// Model used for the memory judgment step; defaults to the chat model.
  pub openai_judgment_model: String,
  pub openai_embedding_model: String,

  pub queue_free: String,
  pub queue_pro: String,

  pub chat_timeout_secs: u64,
  pub embed_timeout_secs: u64,
  pub store_timeout_secs: u64,
}

impl AppEnv {
  fn new() -> Self {
    dotenvy::dotenv().ok();

    let chat_model = required_env("OPENAI_CHAT_MODEL");

    Self {
      database_url: required_env("DATABASE_URL"),
      qdrant_url: required_env("QDRANT_URL"),
      collection_prefix: env_or("COLLECTION_PREFIX", "mem"),
      neo4j_uri: required_env("NEO4J_URI"),
      neo4j_user: required_env("NEO4J_USER"),
      neo4j_password: required_env("NEO4J_PASSWORD"),
      openai_base_url: required_env("OPENAI_BASE_URL"),
      openai_api_key: required_env("OPENAI_API_KEY"),
      openai_judgment_model: env_or("OPENAI_JUDGMENT_MODEL", &chat_model),
      openai_chat_model: chat_model,
      openai_embedding_model: required_env("OPENAI_EMBEDDING_MODEL"),
      queue_free: env_or("QUEUE_FREE", "memory_free"),
      queue_pro: env_or("QUEUE_PRO", "memory_pro"),
      chat_timeout_secs: env_or_u64("CHAT_TIMEOUT_SECS", 120),
      embed_timeout_secs: env_or_u64("EMBED_TIMEOUT_SECS", 60),
      store_timeout_secs: env_or_u64("STORE_TIMEOUT_SECS", 30),
    }
  }
}

pub static APP_ENV: LazyLock<AppEnv> = LazyLock::new(AppEnv::new);
