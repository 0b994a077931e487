//! Status lines for provisioning commands
//!
//! Everything here is silent in quiet mode so stdout stays machine-readable
//! for `--format json|plain`.

use super::context::UiContext;
use console::{style, Style};

/// Outcome marker printed in front of a plain-mode line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Ok,
    Fail,
    Warn,
}

impl Mark {
    fn plain(self) -> String {
        match self {
            Self::Ok => style("[OK]").green().to_string(),
            Self::Fail => style("[FAIL]").red().to_string(),
            Self::Warn => style("[WARN]").yellow().to_string(),
        }
    }
}

/// Command banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.is_quiet() {
        return;
    }
    let title = style(title).cyan().bold();
    if ctx.use_fancy_output() {
        cliclack::intro(title).ok();
    } else {
        println!("{}", title);
    }
}

/// Closing line after every image was handled
pub fn outro_success(ctx: &UiContext, message: &str) {
    outro(ctx, Mark::Ok, message);
}

/// Closing line when some images failed
pub fn outro_warn(ctx: &UiContext, message: &str) {
    outro(ctx, Mark::Warn, message);
}

fn outro(ctx: &UiContext, mark: Mark, message: &str) {
    if ctx.is_quiet() {
        return;
    }
    if ctx.use_fancy_output() {
        let styled = match mark {
            Mark::Ok => style(message).green().bold(),
            Mark::Fail => style(message).red().bold(),
            Mark::Warn => style(message).yellow().bold(),
        };
        cliclack::outro(styled).ok();
    } else {
        println!("{} {}", mark.plain(), message);
    }
}

/// One image handled successfully, e.g. `debian:stable-slim (invowk-provisioned:..., cached)`
pub fn step_ok_detail(ctx: &UiContext, subject: &str, detail: &str) {
    if ctx.is_quiet() {
        return;
    }
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", subject, style(detail).dim())).ok();
    } else {
        println!("  {} {} ({})", Mark::Ok.plain(), subject, detail);
    }
}

/// One image failed
pub fn step_error_detail(ctx: &UiContext, subject: &str, error: &str) {
    if ctx.is_quiet() {
        return;
    }
    if ctx.use_fancy_output() {
        cliclack::log::error(format!("{}: {}", subject, style(error).red())).ok();
    } else {
        println!("  {} {}: {}", Mark::Fail.plain(), subject, error);
    }
}

/// `key: value`, green when `ok` and yellow otherwise
pub fn key_value_status(ctx: &UiContext, key: &str, value: &str, ok: bool) {
    if ctx.is_quiet() {
        return;
    }
    if ctx.use_fancy_output() {
        let color = if ok {
            Style::new().green()
        } else {
            Style::new().yellow()
        };
        println!("  {}: {}", style(key).dim(), color.apply_to(value));
    } else {
        let mark = if ok { "[OK]" } else { "[--]" };
        println!("  {} {}: {}", mark, key, value);
    }
}
