//! The Living Archive: a conversational front-end that grows a narrative
//! knowledge graph from AI-suggested nodes and links.

pub mod archive;
pub mod config;
pub mod conversation;
pub mod graph;
pub mod llm;
pub mod logging;
pub mod merge;
pub mod prompt;
pub mod repl;
pub mod seed;
pub mod storage;
pub mod stream;
