//! nanoedit: a multi-document text editor core.
//!
//! A synchronous UI thread owns all editor state. Syntax highlighting,
//! assistant requests and terminal commands run on a tokio runtime and
//! report back through [`bridge::AsyncBridge`]; [`app::Editor::pump`]
//! applies their results, dropping any that no longer match the document
//! they were computed for.

pub mod api;
pub mod app;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod highlight;
pub mod logging;
pub mod process;
pub mod session;
pub mod utils;
pub mod view;

pub use app::Editor;
