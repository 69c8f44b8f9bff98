//! Shared styling utilities for the CLI.

use comfy_table::{Cell, Color};
use console::Style;

use claimsync_core::StepOutcome;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Table cell for a step outcome.
pub fn outcome_cell(outcome: &StepOutcome) -> Cell {
    match outcome {
        StepOutcome::Applied => Cell::new("✓ applied").fg(Color::Green),
        StepOutcome::Skipped(reason) => Cell::new(format!("– {}", reason)).fg(Color::Yellow),
        StepOutcome::Failed(err) => Cell::new(format!("✗ {}", err)).fg(Color::Red),
    }
}

/// `yes` / `no` with color.
pub fn flag_cell(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styled_strings_keep_message() {
        assert!(success("saved").contains("saved"));
        assert!(error("boom").contains("boom"));
        assert!(warn("careful").contains("careful"));
        assert!(header("Title").contains("Title"));
        assert!(dim("quiet").contains("quiet"));
    }
}
