use anyhow::{Context, Result};

use crate::pipeline::TestReport;

/// Print labelled reports on stdout, human-readable or as JSON.
pub fn print(reports: &[(String, TestReport)], json: bool) -> Result<()> {
    if json {
        let refs: Vec<&TestReport> = reports.iter().map(|(_, report)| report).collect();
        println!("{}", to_json(&refs)?);
    } else {
        for (label, report) in reports {
            println!("{}", render(label, report));
        }
    }
    Ok(())
}

/// Reports as JSON: a single object for one file, an array otherwise.
pub fn to_json(reports: &[&TestReport]) -> Result<String> {
    let json = match reports {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    };
    json.context("Failed to serialize report")
}

pub fn render(label: &str, report: &TestReport) -> String {
    let outcome = &report.execution_outcome;
    let mut out = String::new();

    out.push_str(&format!("== {} ==\n", label));
    out.push_str("--- generated test ---\n");
    out.push_str(&report.test_artifact);
    out.push('\n');

    if let Some(ref staged) = report.staged {
        out.push_str(&format!("--- staged in {} ---\n", staged.workspace.display()));
        out.push_str(&format!("source: {}\n", staged.source_path.display()));
        out.push_str(&format!("test:   {}\n", staged.test_path.display()));
    }

    out.push_str(&format!("--- execution: {} ---\n", outcome.status));
    out.push_str(&outcome.message);
    out.push('\n');

    if !outcome.raw_output.is_empty() {
        if outcome.truncated {
            out.push_str(&format!(
                "--- output (last {} characters) ---\n",
                outcome.raw_output.chars().count()
            ));
        } else {
            out.push_str("--- output ---\n");
        }
        out.push_str(outcome.raw_output.trim_end());
        out.push('\n');
    }

    out
}
