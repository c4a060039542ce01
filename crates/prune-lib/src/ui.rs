use console::{Style, StyledObject};
use lazy_static::lazy_static;

/// Helper struct to apply any necessary formatting to UI output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UI {
    pub should_strip_ansi: bool,
}

impl UI {
    pub fn new(should_strip_ansi: bool) -> Self {
        Self { should_strip_ansi }
    }

    /// Infer the color choice from the `FORCE_COLOR` environment variable,
    /// falling back to checking if stdout is a tty
    pub fn infer() -> Self {
        let env_setting = std::env::var("FORCE_COLOR")
            .ok()
            .and_then(|force_color| Self::strip_ansi_for(&force_color));
        let should_strip_ansi = env_setting.unwrap_or_else(|| !atty::is(atty::Stream::Stdout));
        Self { should_strip_ansi }
    }

    fn strip_ansi_for(force_color: &str) -> Option<bool> {
        match force_color {
            "false" | "0" => Some(true),
            "true" | "1" | "2" | "3" => Some(false),
            _ => None,
        }
    }

    /// Apply the UI color mode to the given styled object
    pub fn apply<D>(&self, obj: StyledObject<D>) -> StyledObject<D> {
        // Setting this to false will skip emitting any ansi codes associated
        // with the style when the object is displayed.
        obj.force_styling(!self.should_strip_ansi)
    }

    /// The line printed for an error that aborted a command
    pub fn error_line(&self, message: impl std::fmt::Display) -> String {
        format!("{} {}", self.apply(ERROR_BADGE.apply_to(" ERROR ")), message)
    }
}

lazy_static! {
    pub static ref GREY: Style = Style::new().dim();
    pub static ref BOLD: Style = Style::new().bold();
    pub static ref BOLD_GREEN: Style = Style::new().green().bold();
    pub static ref ERROR_BADGE: Style = Style::new().red().bold().reverse();
}
