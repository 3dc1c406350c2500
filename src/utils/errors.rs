use crate::cli::ColorMode;
use nu_ansi_term::Color;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_EXIT_CODE: i32 = 1;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

pub(crate) fn configure_color(cmode: ColorMode) {
    let enabled = matches!(cmode, ColorMode::On);

    USE_COLOR.store(enabled, Ordering::Relaxed);
}

fn use_color() -> ColorMode {
    match USE_COLOR.load(Ordering::Relaxed) {
        true => ColorMode::On,
        false => ColorMode::Off,
    }
}

fn report(label: &str, label_color: Color, text: &str) {
    match use_color() {
        ColorMode::On => {
            let style = label_color.bold();
            let text_style = Color::Default.bold();

            eprintln!("{} {}", style.paint(label), text_style.paint(text));
        }
        ColorMode::Off => {
            eprintln!("{} {}", label, text);
        }
    }
}

pub(crate) fn error_internal(text: &str) {
    report("error:", Color::Red, text);
}

pub(crate) fn warn_internal(text: &str) {
    report("warning:", Color::Yellow, text);
}

/// Formats an error along with its chain of sources, outermost first.
pub(crate) fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();

    while let Some(err) = source {
        text.push_str(": ");
        text.push_str(&err.to_string());
        source = err.source();
    }

    text
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::warn_internal(&formatted);
    })
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
    })
}

#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmroute::registry::populate::Error as PopulateError;
    use llmroute::providers::{self, ErrorKind, LlmProvider};

    #[test]
    fn test_error_chain() {
        let err = PopulateError::Backend {
            provider: LlmProvider::Ollama,
            source: providers::Error::from_kind(ErrorKind::InvalidConfiguration),
        };

        assert_eq!(
            error_chain(&err),
            "the \"ollama\" provider could not be activated: the provider configuration is invalid"
        );
    }
}
