use anyhow::{Context, Result};
use nanoedit::api::prompts::AiAction;
use nanoedit::config::AppConfig;
use nanoedit::constants::{APP_NAME, UI_FRAME_INTERVAL};
use nanoedit::highlight::Token;
use nanoedit::process::OutputStream;
use nanoedit::session::{CursorPosition, Document, DocumentId, TextEdit, ViewState};
use nanoedit::view::EditorView;
use nanoedit::{logging, Editor};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

const USAGE: &str = "\
Commands:
  :new                 new untitled document
  :open <path>         open a file
  :save [path]         save the active document
  :reload              discard changes and re-read the active document's file
  :switch <id>         show another document
  :close [id]          close a document (default: active)
  :list                list open documents
  :show                print the active document
  :insert <text>       append text to the active document
  :ai <action> [args]  explain | complete | refactor | docstring | optimize
                       | fix <error> | generate <language> <description>
                       | translate <from> <to>
  !<input>             run a terminal command, or feed input to the running one
  :kill                terminate the running terminal command
  :quit                exit
Any other line is appended to the active document.";

/// Prints everything the core pushes to the surface.
#[derive(Default)]
struct ConsoleView {
    state: ViewState,
}

impl ConsoleView {
    fn print_document(document: &Document) {
        println!("── {} {} (gen {}) ──", document.id(), document.title(), document.generation());
        println!("{}", document.text());
        println!("──");
    }
}

/// Line and column just past the last character.
fn end_of(text: &str) -> CursorPosition {
    let line = text.matches('\n').count();
    let last = text.rsplit('\n').next().unwrap_or("");
    CursorPosition::new(line, last.chars().count())
}

impl EditorView for ConsoleView {
    fn capture(&self) -> ViewState {
        self.state
    }

    fn present(&mut self, document: &Document) {
        self.state = document.view_state();
        Self::print_document(document);
    }

    fn apply_content(&mut self, document: &Document) {
        Self::print_document(document);
    }

    fn apply_highlight(&mut self, document: DocumentId, tokens: &[Token]) {
        tracing::debug!("{} highlighted with {} tokens", document, tokens.len());
    }

    fn append_output(&mut self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => println!("│ {}", line),
            OutputStream::Stderr => println!("│! {}", line),
        }
    }

    fn clear_output(&mut self) {
        // ANSI clear screen and home.
        print!("\x1b[2J\x1b[H");
    }

    fn show_result(&mut self, title: &str, text: &str) {
        println!("== {} ==\n{}\n==", title, text);
    }

    fn show_error(&mut self, message: &str) {
        eprintln!("error: {}", message);
    }
}

/// `cursor_line` is zero-based; completion prompts count from one.
fn parse_action(args: &str, cursor_line: usize) -> Option<AiAction> {
    let (name, rest) = args.split_once(' ').unwrap_or((args, ""));
    let rest = rest.trim();
    let action = match name {
        "explain" => AiAction::Explain,
        "complete" => AiAction::Complete {
            line: cursor_line + 1,
        },
        "refactor" => AiAction::Refactor,
        "docstring" => AiAction::Docstring,
        "optimize" => AiAction::Optimize,
        "fix" => AiAction::Fix {
            error: rest.to_string(),
        },
        "generate" => {
            let (language, description) = rest.split_once(' ')?;
            AiAction::Generate {
                description: description.to_string(),
                language: language.to_string(),
            }
        }
        "translate" => {
            let (from, to) = rest.split_once(' ')?;
            AiAction::Translate {
                from: from.to_string(),
                to: to.trim().to_string(),
            }
        }
        _ => return None,
    };
    Some(action)
}

fn parse_id(arg: &str) -> Option<DocumentId> {
    arg.trim().trim_start_matches('#').parse().ok().map(DocumentId)
}

fn append(editor: &mut Editor<ConsoleView>, text: &str) {
    let offset = editor.sessions().active().text().len();
    editor.edit(TextEdit::insert(offset, text));
    let cursor = end_of(editor.sessions().active().text());
    editor.view_mut().state.cursor = cursor;
}

/// Runs one console line. Returns false to quit.
fn run_command(editor: &mut Editor<ConsoleView>, line: &str) -> Result<bool> {
    if let Some(input) = line.strip_prefix('!') {
        editor.run_in_terminal(input)?;
        return Ok(true);
    }
    let Some(command) = line.strip_prefix(':') else {
        append(editor, &format!("{}\n", line));
        return Ok(true);
    };

    let (name, args) = command.split_once(' ').unwrap_or((command, ""));
    let args = args.trim();
    match name {
        "quit" | "q" => return Ok(false),
        "help" => println!("{}", USAGE),
        "new" => {
            editor.new_document();
        }
        "open" => {
            editor.open_file(Path::new(args))?;
        }
        "save" => {
            let path = (!args.is_empty()).then(|| PathBuf::from(args));
            let saved = editor.save_active(path)?;
            println!("saved {}", saved.display());
        }
        "reload" => editor.reload_active()?,
        "switch" => {
            let id = parse_id(args).context("usage: :switch <id>")?;
            editor.switch_to(id)?;
        }
        "close" => {
            let id = if args.is_empty() {
                editor.sessions().active_id()
            } else {
                parse_id(args).context("usage: :close [id]")?
            };
            editor.close(id)?;
        }
        "list" => {
            let active = editor.sessions().active_id();
            for document in editor.sessions().documents() {
                let marker = if document.id() == active { ">" } else { " " };
                println!("{} {} {}", marker, document.id(), document.title());
            }
        }
        "show" => ConsoleView::print_document(editor.sessions().active()),
        "insert" => append(editor, args),
        "ai" => {
            let line = editor.view().state.cursor.line;
            let action = parse_action(args, line).context("unknown assistant action, see :help")?;
            let request = editor.ask_ai(action, None);
            println!("{} sent", request);
        }
        "kill" => {
            if !editor.terminate_process() {
                println!("nothing running");
            }
        }
        _ => println!("unknown command :{}, see :help", name),
    }
    Ok(true)
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

fn main() -> Result<()> {
    let config = AppConfig::load();
    logging::init(&config.logging);
    tracing::info!("{} starting", APP_NAME);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let mut editor = Editor::new(runtime.handle().clone(), config, ConsoleView::default());
    for arg in std::env::args().skip(1) {
        if let Err(e) = editor.open_file(Path::new(&arg)) {
            editor.view_mut().show_error(&format!("{:#}", e));
        }
    }
    println!("Type :help for commands.");

    let input = spawn_stdin_reader();
    loop {
        match input.recv_timeout(UI_FRAME_INTERVAL) {
            Ok(line) => match run_command(&mut editor, &line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => editor.view_mut().show_error(&format!("{:#}", e)),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        editor.pump();
    }

    drop(editor);
    runtime.shutdown_timeout(Duration::from_secs(1));
    tracing::info!("{} stopped", APP_NAME);
    Ok(())
}
