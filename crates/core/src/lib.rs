//! # Patchloop Core
//!
//! Domain types, collaborator traits, and error definitions for the Patchloop
//! coding agent. This crate has **no framework dependencies** — it defines the
//! model that the tools, agent and provider crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the language model, the filesystem) is a
//! trait here. Implementations live in their respective crates, which keeps
//! the orchestration loop testable with scripted stand-ins.

pub mod error;
pub mod event;
pub mod fs;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FsError, ModelError, ProcessError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use fs::{DirEntry, Filesystem, LocalFilesystem};
pub use message::{ContentPart, Conversation, Role, Turn};
pub use model::{
    FunctionCallingMode, Model, ModelRequest, ModelResponse, ResponsePart, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolArgs, ToolOutcome, ToolRegistry};
