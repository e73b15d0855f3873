//! Application-wide constants for nanoedit.
//!
//! Centralizes the tuning values shared by the background subsystems so the
//! defaults in [`crate::config`] and the tests agree on them.

use std::time::Duration;

// ============================================================================
// Application Identity
// ============================================================================

/// Directory name used under the platform config/data directories.
pub const APP_DIR_NAME: &str = "nanoedit";

/// Application name shown by the console front end.
pub const APP_NAME: &str = "nanoedit";

/// Title given to documents without a backing path.
pub const UNTITLED_TITLE: &str = "Untitled";

// ============================================================================
// UI Loop
// ============================================================================

/// Interval at which the UI loop drains the async bridge.
pub const UI_FRAME_INTERVAL: Duration = Duration::from_millis(16);

// ============================================================================
// Highlighting
// ============================================================================

/// Quiet period after the last edit before a document is re-tokenized.
pub const HIGHLIGHT_DEBOUNCE_MS: u64 = 300;

/// Documents larger than this are not tokenized at all (100 KB).
/// Full re-tokenization is O(n) per quiet period.
pub const MAX_HIGHLIGHT_BYTES: usize = 100_000;

// ============================================================================
// AI Requests
// ============================================================================

/// Default time to wait for a provider before reporting a timeout.
pub const AI_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Sampling temperature sent to every backend.
pub const AI_TEMPERATURE: f32 = 0.2;

/// Nucleus sampling value sent to every backend.
pub const AI_TOP_P: f32 = 0.9;

/// System prompt prepended to every request.
pub const AI_SYSTEM_PROMPT: &str =
    "You are a programming assistant embedded in a text editor. Be concise.";

/// Settled requests whose final state stays queryable.
pub const AI_SETTLED_HISTORY: usize = 256;

// ============================================================================
// Interactive Processes
// ============================================================================

/// How long a child gets to exit on its own after its stdin is closed.
pub const TERMINATE_GRACE_MS: u64 = 2000;

/// Upper bound on draining buffered output once the child has exited.
/// Grandchildren holding the pipes open must not stall the exit report.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
