mod chat;
mod embedding;
mod kv;
mod object_store;
mod relational_store;
mod speech;
mod vector_store;
mod vision;

pub use chat::{ChatCompletion, ChatMessage, ChatModel, ChatRole};
pub use embedding::EmbeddingModel;
pub use kv::{KVStore, WindowAdmission};
pub use object_store::ObjectStore;
pub use relational_store::RelationalStore;
pub use speech::SpeechToText;
pub use vector_store::{ScoredVectorRecord, VectorRecord, VectorStore};
pub use vision::VisionModel;
