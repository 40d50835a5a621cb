//! Output formatting utilities for CLI commands

use colored::Colorize;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a section header
pub fn header(msg: &str) {
    println!("{}", msg.bold());
}

/// Format a metric value with its unit
pub fn format_value(value: f64, unit: tally_shared::Unit) -> String {
    use tally_shared::Unit;
    match unit {
        Unit::Percentage => format!("{:.2} %", value),
        Unit::Bytes => format!("{} bytes", value),
        Unit::Cycles => format!("{} cycles", value),
        Unit::Generic => format!("{}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_shared::Unit;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(75.0, Unit::Percentage), "75.00 %");
        assert_eq!(format_value(256.0, Unit::Bytes), "256 bytes");
        assert_eq!(format_value(12.0, Unit::Generic), "12");
    }
}
