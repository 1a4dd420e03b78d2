//! `reel show` command.

use std::fmt::Write as _;
use std::path::Path;

use crate::cassette::config::ChainConfig;
use crate::cassette::format::{PersistedChain, StepRecord, StoredBody};

/// Execute the `show` command.
///
/// Prints one block per step in chain order, or the whole chain as JSON
/// when `json` is set.
///
/// # Errors
///
/// Returns an error string if the chain cannot be read.
pub fn run(dir: &Path, config: &ChainConfig, json: bool) -> Result<(), String> {
    let chain = PersistedChain::read(dir, config).map_err(|err| err.to_string())?;
    if json {
        let rendered = serde_json::to_string_pretty(&chain).map_err(|err| err.to_string())?;
        println!("{rendered}");
    } else {
        print!("{}", render(&chain));
    }
    Ok(())
}

/// Human-readable summary of a chain.
#[must_use]
pub fn render(chain: &PersistedChain) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Chain: {}", chain.name);
    let _ = writeln!(out, "Recorded: {}", chain.recorded_at.to_rfc3339());
    let _ = writeln!(out, "Steps: {}", chain.steps.len());
    for step in &chain.steps {
        render_step(&mut out, step);
    }
    out
}

fn render_step(out: &mut String, step: &StepRecord) {
    let request = &step.request;
    let response = &step.response;
    let _ = writeln!(out, "\n{} [{}]", step.id, step.host);
    let _ = writeln!(
        out,
        "  > {} {}{}",
        request.method,
        request.url,
        describe_body(request.body.as_ref())
    );
    let _ = writeln!(
        out,
        "  < {} {} {}{}",
        response.version,
        response.status,
        response.reason,
        describe_body(response.body.as_ref())
    );
    for (name, value) in response.headers.iter() {
        let _ = writeln!(out, "    {name}: {value}");
    }
    match &step.next {
        Some(next) => {
            let _ = writeln!(out, "  next: {next}");
        }
        None => {
            let _ = writeln!(out, "  (end of chain)");
        }
    }
}

fn describe_body(body: Option<&StoredBody>) -> String {
    match body {
        None => String::new(),
        Some(StoredBody::Inline(text)) => format!(" ({} bytes inline)", text.len()),
        Some(StoredBody::File(name)) => format!(" (body in {name})"),
    }
}
