//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
    quiet: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else if !self.quiet {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if !self.quiet {
            eprintln!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if !self.quiet {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

/// Progress bar for image builds.
///
/// Understands Podman `STEP N/M: <instruction>` lines and BuildKit
/// `#N [stage K/M] <instruction>` lines. Draws an indicatif bar on stderr in
/// interactive mode; otherwise prints step lines prefixed with the label.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
    label: String,
    quiet: bool,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(0);
            let template = "  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}";
            if let Ok(bar_style) = ProgressStyle::default_bar().template(template) {
                bar.set_style(
                    bar_style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self {
            bar,
            label: label.to_string(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Process one line of build output
    pub fn on_line(&self, line: String) {
        if let Some((n, total, instruction)) = parse_step_line(&line) {
            match self.bar {
                Some(ref bar) => {
                    bar.set_length(total);
                    bar.set_position(n);
                    bar.set_message(instruction.to_string());
                }
                None if !self.quiet => {
                    eprintln!("  [{}] STEP {}/{}: {}", self.label, n, total, instruction)
                }
                None => {}
            }
        } else if let Some(ref bar) = self.bar {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !is_build_noise(trimmed) {
                bar.set_message(truncate(trimmed, 60));
            }
        }
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let kept: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Engine bookkeeping lines that aren't useful to display
fn is_build_noise(line: &str) -> bool {
    line.starts_with("--->")
        || line.starts_with("-->")
        || line.starts_with("Removing intermediate")
        || line.starts_with("COMMIT")
        || line.starts_with("Successfully tagged")
        || line.ends_with(" DONE") && line.starts_with('#')
}

/// Parse a build step line.
///
/// Podman: `STEP 3/7: COPY invowk /invowk/bin/invowk`
/// BuildKit: `#6 [2/4] COPY invowk /invowk/bin/invowk`
fn parse_step_line(line: &str) -> Option<(u64, u64, &str)> {
    if let Some(rest) = line.strip_prefix("STEP ") {
        let (counts, instruction) = rest.split_once(':')?;
        let (n, total) = parse_counts(counts)?;
        return Some((n, total, instruction.trim()));
    }

    let rest = line.strip_prefix('#')?;
    let open = rest.find('[')?;
    let close = rest[open..].find(']')? + open;
    let bracket = &rest[open + 1..close];
    // Stage name may precede the counts: `[builder 2/4]`
    let counts = bracket.rsplit(' ').next()?;
    let (n, total) = parse_counts(counts)?;
    Some((n, total, rest[close + 1..].trim()))
}

fn parse_counts(counts: &str) -> Option<(u64, u64)> {
    let (n, total) = counts.trim().split_once('/')?;
    Some((n.parse().ok()?, total.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Detecting container engine...");
        spinner.stop("Using podman");
    }

    #[test]
    fn parse_podman_step() {
        let (n, m, instr) = parse_step_line("STEP 3/7: COPY invowk /invowk/bin/invowk").unwrap();
        assert_eq!((n, m), (3, 7));
        assert_eq!(instr, "COPY invowk /invowk/bin/invowk");
    }

    #[test]
    fn parse_buildkit_step() {
        let (n, m, instr) = parse_step_line("#6 [2/4] COPY modules/ /invowk/modules/").unwrap();
        assert_eq!((n, m), (2, 4));
        assert_eq!(instr, "COPY modules/ /invowk/modules/");

        let (n, m, _) = parse_step_line("#4 [builder 1/3] FROM docker.io/library/debian").unwrap();
        assert_eq!((n, m), (1, 3));
    }

    #[test]
    fn parse_step_line_not_a_step() {
        assert!(parse_step_line("---> abc123def").is_none());
        assert!(parse_step_line("#5 DONE 0.1s").is_none());
        assert!(parse_step_line("#1 [internal] load build definition").is_none());
        assert!(parse_step_line("").is_none());
    }

    #[test]
    fn build_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let progress = BuildProgress::new(&ctx, "debian:stable-slim");
        progress.on_line("STEP 1/5: FROM debian:stable-slim".to_string());
        progress.on_line("---> abc123".to_string());
        progress.finish();
    }

    #[test]
    fn noise_filtered() {
        assert!(is_build_noise("---> abc123def"));
        assert!(is_build_noise("COMMIT invowk-provisioned:abc123"));
        assert!(is_build_noise("#7 DONE"));
        assert!(!is_build_noise("Setting up ca-certificates"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 60), "short");
        let long = "é".repeat(80);
        assert_eq!(truncate(&long, 10).chars().count(), 10);
    }
}
