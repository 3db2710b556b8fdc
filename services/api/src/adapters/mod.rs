pub mod db;
pub mod illustration;
pub mod narrative_llm;
pub mod speech;
pub mod storage;

pub use db::DbAdapter;
pub use illustration::PlaceholderIllustrator;
pub use narrative_llm::OpenAiNarrativeAdapter;
pub use speech::ElevenLabsSpeechAdapter;
pub use storage::AudioStore;
