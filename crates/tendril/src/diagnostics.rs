use anyhow::Result;
use colored::Colorize;
use tendril_core::{Diagnostic, Diagnostics, Severity, WithDiagnostics};

fn render(diag: &Diagnostic, depth: usize) {
    let label = match diag.severity {
        Severity::Error => "error:".red().bold(),
        Severity::Warning => "warning:".yellow().bold(),
        Severity::Advice => "advice:".cyan(),
    };
    let indent = "  ".repeat(depth);
    if diag.subject.is_empty() {
        eprintln!("{indent}{label} {}", diag.body);
    } else {
        eprintln!("{indent}{label} {} {}", diag.subject.bold(), diag.body);
    }
    if let Some(child) = &diag.child {
        render(child, depth + 1);
    }
}

/// Print every finding to stderr.
pub fn report(diagnostics: &Diagnostics) {
    for diag in diagnostics.iter() {
        render(diag, 0);
    }
}

/// Print the findings of `result` and fail if any of them is an error.
pub fn check<T>(result: WithDiagnostics<T>, what: &str) -> Result<T> {
    report(&result.diagnostics);
    result.output_result().map_err(|diagnostics| {
        let errors = diagnostics.errors().len();
        anyhow::anyhow!("{what}: {errors} error(s)")
    })
}
