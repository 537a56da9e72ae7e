//! Question validation and prompt command parsing.

use seeker_core::config::K_LIMIT as MAX_K;

pub const NO_QUESTION_WARNING: &str = "⚠️ No question inputted!";

/// The question to search for, or `None` when there is nothing to search.
pub fn validate_question(raw: &str) -> Option<&str> {
    let q = raw.trim();
    (!q.is_empty()).then_some(q)
}

/// Parse a result count in `1..=MAX_K`; also used as the clap value parser.
pub fn parse_k(s: &str) -> Result<usize, String> {
    let k: usize = s.trim().parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (1..=MAX_K).contains(&k) {
        Ok(k)
    } else {
        Err(format!("k must be between 1 and {MAX_K}, got {k}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    Ask(String),
    SetK(usize),
    Stats,
    Reload,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_prompt_line(line: &str) -> PromptCommand {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return match validate_question(line) {
            Some(q) => PromptCommand::Ask(q.to_string()),
            None => PromptCommand::Empty,
        };
    };
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("k"), Some(n)) => match parse_k(n) {
            Ok(k) => PromptCommand::SetK(k),
            Err(e) => PromptCommand::Invalid(e),
        },
        (Some("k"), None) => PromptCommand::Invalid("usage: /k <1-100>".into()),
        (Some("stats"), _) => PromptCommand::Stats,
        (Some("reload"), _) => PromptCommand::Reload,
        (Some("help" | "h" | "?"), _) => PromptCommand::Help,
        (Some("quit" | "q" | "exit"), _) => PromptCommand::Quit,
        _ => PromptCommand::Invalid(format!("unknown command '/{rest}', try /help")),
    }
}

pub const PROMPT_HELP: &str = "\
Type a question to find similar ones.
  /k <N>     number of results (1-100)
  /stats     corpus size, dimension and model
  /reload    reload data files changed on disk
  /help      this text
  /quit      exit";
