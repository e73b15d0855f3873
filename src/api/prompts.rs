//! Prompt catalogue for the editor's assistant actions.

/// Where the result of an action ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTarget {
    /// Shown in a result panel.
    Panel,
    /// Inserted into the originating document at the cursor.
    InsertAtCursor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiAction {
    Explain,
    Complete { line: usize },
    Generate { description: String, language: String },
    Refactor,
    Fix { error: String },
    Docstring,
    Optimize,
    Translate { from: String, to: String },
}

impl AiAction {
    pub fn title(&self) -> &'static str {
        match self {
            AiAction::Explain => "Explain Code",
            AiAction::Complete { .. } => "Complete Code",
            AiAction::Generate { .. } => "Generate Code",
            AiAction::Refactor => "Refactor Code",
            AiAction::Fix { .. } => "Fix Errors",
            AiAction::Docstring => "Generate Docstring",
            AiAction::Optimize => "Optimize Code",
            AiAction::Translate { .. } => "Translate Code",
        }
    }

    pub fn target(&self) -> ResultTarget {
        match self {
            AiAction::Complete { .. } => ResultTarget::InsertAtCursor,
            _ => ResultTarget::Panel,
        }
    }

    /// Builds the user prompt for `code` (the selection, or the whole document).
    pub fn prompt(&self, code: &str) -> String {
        match self {
            AiAction::Explain => format!(
                "Explain this code concisely:\n\n```\n{}\n```\n\n\
                 Provide a brief explanation of what it does.",
                code
            ),
            AiAction::Complete { line } => format!(
                "Complete this code. Return ONLY the completion, no explanations:\n\n{}\n\n\
                 Complete from line {}. Provide the next 1-3 lines of code.",
                code, line
            ),
            AiAction::Generate {
                description,
                language,
            } => format!(
                "Generate {} code for: {}\n\nReturn ONLY the code, no explanations or markdown.",
                language, description
            ),
            AiAction::Refactor => format!(
                "Refactor this code to improve readability and efficiency. \
                 Return ONLY the refactored code:\n\n```\n{}\n```",
                code
            ),
            AiAction::Fix { error } => format!(
                "Fix this code error. Return ONLY the corrected code:\n\n\
                 Code:\n```\n{}\n```\n\nError: {}",
                code, error
            ),
            AiAction::Docstring => format!(
                "Generate a docstring for this function/class. \
                 Return ONLY the docstring:\n\n```\n{}\n```",
                code
            ),
            AiAction::Optimize => format!(
                "Analyze this code and suggest optimizations:\n\n```\n{}\n```\n\n\
                 Provide specific suggestions.",
                code
            ),
            AiAction::Translate { from, to } => format!(
                "Translate this {} code to {}. Return ONLY the translated code:\n\n```\n{}\n```",
                from, to, code
            ),
        }
    }
}

/// Strips a surrounding markdown fence from a reply meant for insertion.
pub fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (```rust) on the opening line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim_end().to_string()
}
