//! Local document chat server.
//!
//! tichat serves a small web UI and JSON/streaming HTTP API for chatting with a
//! locally hosted language model, either directly or grounded in documents
//! the user has uploaded. Every finished exchange is saved to a per-session
//! JSON transcript that can be reopened later.
//!
//! # Architecture
//!
//! - **Inference**: an [Ollama](https://ollama.com) server, optionally
//!   started and stopped by tichat itself
//! - **Retrieval**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   for cosine nearest-neighbour search over embedded document chunks
//! - **Sessions**: one JSON array per conversation under `~/.tichat/prev_msgs/`
//! - **Transport**: axum HTTP with chunked streaming responses
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`settings`]: the hand-edited `settings.json` connection settings
//! - [`session`]: session transcripts, titles and the process-wide chat context
//! - [`inference`]: language-model and embedding gateway
//! - [`index`]: document reading, chunking and the vector index
//! - [`chat`]: chat memory and the retrieval chat engine
//! - [`api`]: HTTP handlers
//! - [`server`]: state wiring and the server loop
//! - [`supervisor`]: the inference server child process

pub mod api;
pub mod chat;
pub mod config;
pub mod index;
pub mod inference;
pub mod server;
pub mod session;
pub mod settings;
pub mod supervisor;
