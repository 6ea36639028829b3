//! Result rendering.

use crate::error::CliResult;
use clap::ValueEnum;
use fleetcp_protocol::TransferResult;
use std::fmt::Write;

/// Output format for transfer results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Indented worker / path / outcome text.
    #[default]
    Nested,
    /// Pretty-printed JSON.
    Json,
}

/// Renders a transfer result.
pub fn render(result: &TransferResult, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Nested => Ok(render_nested(result)),
    }
}

fn render_nested(result: &TransferResult) -> String {
    let mut out = String::new();
    for (worker, paths) in result.iter() {
        let _ = writeln!(out, "{worker}:");
        for (path, outcome) in paths {
            let _ = writeln!(out, "    {path}:");
            let _ = writeln!(out, "        {outcome}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcp_protocol::Outcome;

    fn sample() -> TransferResult {
        let mut result = TransferResult::new();
        result.record("w1", "/etc/a.txt", Outcome::Success);
        result.record("w2", "/etc/a.txt", Outcome::failure("disk full"));
        result
    }

    #[test]
    fn nested_output() {
        let text = render(&sample(), OutputFormat::Nested).unwrap();
        assert_eq!(
            text,
            "w1:\n    /etc/a.txt:\n        True\nw2:\n    /etc/a.txt:\n        disk full\n"
        );
    }

    #[test]
    fn json_output() {
        let text = render(&sample(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["w1"]["/etc/a.txt"], serde_json::Value::Bool(true));
        assert_eq!(value["w2"]["/etc/a.txt"], "disk full");
    }
}
