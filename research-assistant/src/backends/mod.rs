//! Concrete collaborators: chat model, search providers and report sink

pub mod file_sink;
pub mod openai;
pub mod tavily;
pub mod wikipedia;

pub use file_sink::FileSink;
pub use openai::OpenAiBackend;
pub use tavily::TavilySearch;
pub use wikipedia::WikipediaSearch;
