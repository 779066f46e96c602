mod error;
pub use error::{AppError, EngineError};

mod graph;
pub use graph::{EntityRef, RelationRef};

mod env;
pub use env::APP_ENV;

mod ids;
pub use ids::{EntityKey, FactId, VectorId};

mod message;
pub use message::{Message, MessageRole};
