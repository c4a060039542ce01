use std::marker::PhantomData;

use chrono::Local;
use owo_colors::{
    colors::{Black, Default, Red, Yellow},
    Color, OwoColorize,
};
use tracing::{field::Visit, metadata::LevelFilter, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        self,
        format::Writer,
        FmtContext, FormatEvent, FormatFields,
    },
    prelude::*,
    registry::LookupSpan,
    util::TryInitError,
    EnvFilter, Registry,
};

use crate::ui::UI;

pub const LOG_VERBOSITY_ENV_VAR: &str = "PRUNE_LOG_VERBOSITY";

/// Installs the global subscriber that writes events with the
/// `PruneFormatter`.
///
/// ## Logging behaviour:
/// - ANSI colors are used unless the UI strips them.
/// - If the `PRUNE_LOG_VERBOSITY` env var is set, it will be used to set the
///   verbosity level. Otherwise, the default is `WARN`. See the documentation
///   on the RUST_LOG env var for syntax.
/// - A non zero `verbosity` overrides the default global log level, but not
///   per-module settings from the environment.
pub fn init(verbosity: u8, ui: &UI) -> Result<(), TryInitError> {
    let stdout = fmt::layer()
        .event_format(PruneFormatter::new_with_ansi(!ui.should_strip_ansi))
        .with_filter(env_filter(verbosity));

    Registry::default().with(stdout).try_init()
}

fn level_override(verbosity: u8) -> Option<LevelFilter> {
    match verbosity {
        0 => None,
        1 => Some(LevelFilter::INFO),
        2 => Some(LevelFilter::DEBUG),
        _ => Some(LevelFilter::TRACE),
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var(LOG_VERBOSITY_ENV_VAR)
        .from_env_lossy();

    match level_override(verbosity) {
        Some(max_level) => filter.add_directive(max_level.into()),
        None => filter,
    }
}

/// The formatter for prune output
///
/// - Errors are red
/// - Warnings are yellow
/// - Info is default
/// - Debug and trace are default, but with timestamp, level and target
///   attached
///
/// Spans are not printed, and neither is any event metadata other than the
/// message set when calling `debug!(...)` or `info!(...)` etc.
pub struct PruneFormatter {
    is_ansi: bool,
}

impl PruneFormatter {
    pub fn new_with_ansi(is_ansi: bool) -> Self {
        Self { is_ansi }
    }
}

impl<S, N> FormatEvent<S, N> for PruneFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let level = event.metadata().level();
        let target = event.metadata().target();

        match *level {
            Level::ERROR => {
                write_string::<Red, Black>(writer.by_ref(), self.is_ansi, level.as_str())
                    .and_then(|_| write_message::<Red, Default>(writer, self.is_ansi, event))
            }
            Level::WARN => {
                write_string::<Yellow, Black>(writer.by_ref(), self.is_ansi, level.as_str())
                    .and_then(|_| write_message::<Yellow, Default>(writer, self.is_ansi, event))
            }
            Level::INFO => write_message::<Default, Default>(writer, self.is_ansi, event),
            // trace and debug use the same style
            _ => {
                let now = Local::now();
                write!(
                    writer,
                    "{} [{}] {}: ",
                    now.format("%Y-%m-%dT%H:%M:%S.%3f%z"),
                    level,
                    target,
                )
                .and_then(|_| write_message::<Default, Default>(writer, self.is_ansi, event))
            }
        }
    }
}

/// A visitor that writes the message field of an event to the given writer.
///
/// The FG and BG type parameters are the foreground and background colors
/// to use when writing the message.
struct MessageVisitor<'a, FG: Color, BG: Color> {
    colorize: bool,
    writer: Writer<'a>,
    _fg: PhantomData<FG>,
    _bg: PhantomData<BG>,
}

impl<'a, FG: Color, BG: Color> Visit for MessageVisitor<'a, FG, BG> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            if self.colorize {
                let value = value.fg::<FG>().bg::<BG>();
                let _ = write!(self.writer, "{:?}", value);
            } else {
                let _ = write!(self.writer, "{:?}", value);
            }
        }
    }
}

fn write_string<FG: Color, BG: Color>(
    mut writer: Writer<'_>,
    colorize: bool,
    value: &str,
) -> Result<(), std::fmt::Error> {
    if colorize {
        let value = value.fg::<FG>().bg::<BG>();
        write!(writer, "{} ", value)
    } else {
        write!(writer, "{} ", value)
    }
}

/// Writes the message field of an event to the given writer.
fn write_message<FG: Color, BG: Color>(
    mut writer: Writer<'_>,
    colorize: bool,
    event: &Event,
) -> Result<(), std::fmt::Error> {
    let mut visitor = MessageVisitor::<FG, BG> {
        colorize,
        writer: writer.by_ref(),
        _fg: PhantomData,
        _bg: PhantomData,
    };
    event.record(&mut visitor);
    writeln!(writer)
}
