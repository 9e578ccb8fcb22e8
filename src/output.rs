use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use log::info;
use serde::Serialize;

fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Prints the tool name and version to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🚦 gocd-monitor"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GoCD pipeline monitor")
    );
}

fn render_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

/// Writes `value` as JSON to `output`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> Result<()> {
    let json = render_json(value, pretty)?;

    if let Some(output_path) = output {
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        info!("Report written to: {}", output_path.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
