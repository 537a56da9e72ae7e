//! The interactive `seeker>` loop.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::warn;

use seeker_core::config::Settings;
use seeker_search::{get_similar_questions_with_score, Resources};

use crate::input::{parse_prompt_line, PromptCommand, NO_QUESTION_WARNING, PROMPT_HELP};
use crate::render::{render_json, render_stats, render_table};

pub fn warm_up_with_spinner(resources: &Resources) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("Loading model and corpus...");
    pb.enable_steady_tick(Duration::from_millis(120));
    let loaded = resources.warm_up();
    pb.finish_and_clear();
    loaded
}

/// Read commands from `input` until `/quit` or end of input.
///
/// Failures of a single command are reported on `err` and the loop goes on;
/// only I/O errors on the streams end it.
pub fn run_prompt<R: BufRead, O: Write, E: Write>(
    settings: &Settings,
    mut resources: Resources,
    mut k: usize,
    json: bool,
    input: R,
    out: &mut O,
    err: &mut E,
) -> Result<()> {
    let mut lines = input.lines();
    loop {
        write!(out, "seeker> ")?;
        out.flush()?;
        let Some(line) = lines.next() else { break };
        match parse_prompt_line(&line?) {
            PromptCommand::Ask(q) => match get_similar_questions_with_score(&resources, &q, k) {
                Ok(results) if json => writeln!(out, "{}", render_json(&results)?)?,
                Ok(results) => write!(out, "{}", render_table(&results))?,
                Err(e) => writeln!(err, "❌ {e:#}")?,
            },
            PromptCommand::SetK(n) if n > settings.search.max_k => {
                writeln!(err, "⚠️ k must be at most {}", settings.search.max_k)?;
            }
            PromptCommand::SetK(n) => {
                k = n;
                writeln!(out, "✅ k = {k}")?;
            }
            PromptCommand::Stats => match resources.stats() {
                Ok(stats) => writeln!(out, "{}", render_stats(&stats))?,
                Err(e) => writeln!(err, "❌ {e:#}")?,
            },
            PromptCommand::Reload => {
                let stale = resources.stale_files();
                if stale.is_empty() {
                    writeln!(out, "✅ Data files unchanged")?;
                    continue;
                }
                for path in &stale {
                    writeln!(out, "🔄 {} changed", path.display())?;
                }
                resources = resources.reload_data();
                match warm_up_with_spinner(&resources).and_then(|()| resources.stats()) {
                    Ok(stats) => writeln!(out, "{}", render_stats(&stats))?,
                    Err(e) => {
                        warn!("reload failed: {e:#}");
                        writeln!(err, "❌ {e:#}")?;
                    }
                }
            }
            PromptCommand::Help => writeln!(out, "{PROMPT_HELP}")?,
            PromptCommand::Quit => break,
            PromptCommand::Empty => writeln!(err, "{NO_QUESTION_WARNING}")?,
            PromptCommand::Invalid(msg) => writeln!(err, "⚠️ {msg}")?,
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_embed::FakeEmbedder;
    use tempfile::TempDir;

    fn run(resources: Resources, settings: &Settings, script: &str) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        run_prompt(settings, resources, 5, false, script.as_bytes(), &mut out, &mut err).unwrap();
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn failing_stats_keeps_the_session_alive() {
        let tmp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.data.embeddings_path = tmp.path().join("gone.npy");
        settings.data.question_data_path = tmp.path().join("gone.json");
        let resources = Resources::with_embedder(&settings, Box::new(FakeEmbedder::new(8)));

        let (out, err) = run(resources, &settings, "/stats\nwho shot first\n/k 3\n/help\n/quit\n/k 9\n");
        assert!(err.contains("gone.npy"), "{err}");
        assert!(out.contains("k = 3"), "{out}");
        assert!(out.contains("/reload"), "{out}");
        // nothing after /quit runs
        assert!(!out.contains("k = 9"));
    }

    #[test]
    fn k_above_configured_max_is_refused() {
        let tmp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.search.max_k = 10;
        settings.data.embeddings_path = tmp.path().join("e.npy");
        let resources = Resources::with_embedder(&settings, Box::new(FakeEmbedder::new(8)));
        let (out, err) = run(resources, &settings, "/k 50\n\n");
        assert!(err.contains("at most 10"), "{err}");
        assert!(err.contains("No question inputted!"), "{err}");
        assert!(!out.contains("k = 50"));
    }
}
