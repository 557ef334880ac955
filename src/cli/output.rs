//! Terminal output helpers.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Consistent styled output for CLI commands.
pub struct Output;

impl Output {
    pub fn info(message: &str) {
        println!("{}", message);
    }

    pub fn success(message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", style("!").yellow().bold(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn header(message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn kv(key: &str, value: &str) {
        println!("  {} {}", style(format!("{}:", key)).dim(), value);
    }

    pub fn list_item(message: &str) {
        println!("  {} {}", style("•").cyan(), message);
    }

    /// One indexed source with its fragment count.
    pub fn source_info(source_id: &str, fragment_count: u32) {
        println!(
            "  {} {} {}",
            style("•").cyan(),
            style(source_id).bold(),
            style(format!("({} fragments)", fragment_count)).dim()
        );
    }

    /// One retrieval result with score, source, and a content preview.
    pub fn search_result(source: &str, location: &str, score: f32, content: &str) {
        println!(
            "  {} {} {}",
            style(format!("[{:.3}]", score)).cyan(),
            style(source).bold(),
            style(format!("({})", location)).dim()
        );
        println!("    {}", Self::content_preview(content, 200));
    }

    /// Collapse whitespace and truncate for single-line display.
    pub fn content_preview(content: &str, max_chars: usize) -> String {
        let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.chars().count() <= max_chars {
            collapsed
        } else {
            let truncated: String = collapsed.chars().take(max_chars).collect();
            format!("{}...", truncated.trim_end())
        }
    }

    pub fn progress_bar(len: u64, message: &str) -> ProgressBar {
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(message.to_string());
        bar
    }

    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_preview_collapses_whitespace() {
        let preview = Output::content_preview("line one\n\n  line   two", 100);
        assert_eq!(preview, "line one line two");
    }

    #[test]
    fn content_preview_truncates_on_char_boundaries() {
        let preview = Output::content_preview("héllo wörld", 7);
        assert_eq!(preview, "héllo w...");
    }
}
