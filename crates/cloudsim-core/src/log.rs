//! Logging facilities.
//!
//! Messages of components are prefixed with the simulation time, the level label and the component name,
//! e.g. `[12.500 INFO  datacenter] vm #3 created`. Labels are colored only when stderr is a terminal.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::Level;
use serde_json::{json, Value};

use crate::event::Event;

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

/// Returns the padded label and the color used for the level.
#[doc(hidden)]
pub fn level_label(level: Level) -> ColoredString {
    let (label, color) = match level {
        Level::Error => ("ERROR", Color::Red),
        Level::Warn => ("WARN ", Color::Yellow),
        Level::Info => ("INFO ", Color::Green),
        Level::Debug => ("DEBUG", Color::Blue),
        Level::Trace => ("TRACE", Color::Cyan),
    };
    get_colored(label, color)
}

#[doc(hidden)]
#[macro_export]
macro_rules! log_with_ctx {
    ($level:expr, $ctx:expr, $msg:expr) => (
        log::log!(
            target: $ctx.name(),
            $level,
            "[{:.3} {} {}] {}",
            $ctx.time(), $crate::log::level_label($level), $ctx.name(), $msg
        )
    );
    ($level:expr, $ctx:expr, $format:expr, $($arg:tt)+) => (
        log::log!(
            target: $ctx.name(),
            $level,
            concat!("[{:.3} {} {}] ", $format),
            $ctx.time(), $crate::log::level_label($level), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the info level on behalf of the component owning the context.
///
/// # Examples
///
/// ```rust
/// use cloudsim_core::{log_info, Simulation};
///
/// let mut sim = Simulation::new(123);
/// let ctx = sim.create_context("comp");
/// log_info!(ctx, "started");
/// log_info!(ctx, "processed {} items", 10);
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::log_with_ctx!(log::Level::Info, $ctx, $($arg)+));
}

/// Logs a message at the debug level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::log_with_ctx!(log::Level::Debug, $ctx, $($arg)+));
}

/// Logs a message at the trace level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::log_with_ctx!(log::Level::Trace, $ctx, $($arg)+));
}

/// Logs a message at the warn level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::log_with_ctx!(log::Level::Warn, $ctx, $($arg)+));
}

/// Logs a message at the error level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::log_with_ctx!(log::Level::Error, $ctx, $($arg)+));
}

fn event_json(event: &Event) -> Value {
    json!({"type": event.tag(), "data": event.data, "src": event.src, "dst": event.dst})
}

fn log_event(level: Level, what: &str, event: &Event) {
    log::log!(
        target: "simulation",
        level,
        "[{:.3} {} simulation] {}: {}",
        event.time,
        level_label(level),
        what,
        event_json(event)
    );
}

/// Logs an event that was not matched by any arm of [`cast!`](crate::cast!).
pub fn log_unhandled_event(event: Event) {
    log_event(Level::Error, "Unhandled event", &event);
}

/// Logs an event whose destination has no registered handler. Such events are dropped.
pub(crate) fn log_undelivered_event(event: Event) {
    log_event(Level::Debug, "Undelivered event", &event);
}

/// Logs an event rejected by the simulation.
pub(crate) fn log_incorrect_event(event: Event, msg: &str) {
    log_event(Level::Error, &format!("Incorrect event ({})", msg), &event);
}
