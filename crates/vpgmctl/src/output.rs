//! Output formatting - ASCII-only terminal output.
//!
//! JSON documents go to stdout (or a file); human summaries go to stderr so
//! stdout can be piped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use vpgm_common::{Instance, QuestionPage};

const BAR_WIDTH: usize = 20;

/// Pretty-print `value` to stdout, or to `output` if given
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", text))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} wrote {}", "[OK]".bright_green(), path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Text bar for a probability in [0, 1]
pub fn probability_bar(p: f64) -> String {
    let filled = ((p.clamp(0.0, 1.0) * BAR_WIDTH as f64).round()) as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

/// Most probable state of one latent posterior, if it has any numeric states
pub fn top_state(posterior: &Value) -> Option<(&str, f64)> {
    posterior
        .get("state_probabilities")?
        .as_object()?
        .iter()
        .filter_map(|(state, p)| p.as_f64().map(|p| (state.as_str(), p)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

pub fn print_instance_summary(instance: &Instance, options: &[String]) {
    eprintln!();
    eprintln!(
        "{}  template {}",
        "[VALID]".bright_green(),
        instance.template_id().cyan()
    );

    eprintln!();
    eprintln!("[LATENTS]");
    for (name, posterior) in instance.latent_posteriors() {
        match top_state(posterior) {
            Some((state, p)) => eprintln!("  {:<28} {} ({:.2})", name, state, p),
            None => eprintln!("  {:<28} -", name),
        }
    }

    let selected = instance.selected_answer();
    eprintln!();
    eprintln!("[ANSWER]");
    for option in options {
        let p = instance.option_probability(option).unwrap_or(0.0);
        let line = format!("  {} {:.2}  {}", probability_bar(p), p, option);
        if *option == selected {
            eprintln!("{}", line.bright_green());
        } else {
            eprintln!("{}", line);
        }
    }
    eprintln!("  selected: {}", selected.bold());
}

pub fn print_question_page(page: &QuestionPage) {
    for item in &page.items {
        let subject = item.subject.as_deref().unwrap_or("-");
        println!("{:<10} {:<20} {}", item.id.cyan(), subject.dimmed(), item.question);
    }
    let last_page = page.total.div_ceil(page.limit.max(1)).max(1);
    eprintln!(
        "{}",
        format!(
            "page {}/{} ({} of {} questions)",
            page.page,
            last_page,
            page.items.len(),
            page.total
        )
        .dimmed()
    );
}
