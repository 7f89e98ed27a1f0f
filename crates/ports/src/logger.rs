//! Logger port
//!
//! Purely observational. `log` returns nothing, so a broken sink can never
//! change what the engine does.

use tracing::{Level, debug, error, info, trace, warn};

/// Receives engine log records: level, message, and key/value context.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str, context: &[(&str, &str)]);
}

/// Forwards records to `tracing` under the `authkit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: &[(&str, &str)]) {
        let context = render_context(context);
        if level == Level::ERROR {
            error!(target: "authkit", context = %context, "{message}");
        } else if level == Level::WARN {
            warn!(target: "authkit", context = %context, "{message}");
        } else if level == Level::INFO {
            info!(target: "authkit", context = %context, "{message}");
        } else if level == Level::DEBUG {
            debug!(target: "authkit", context = %context, "{message}");
        } else {
            trace!(target: "authkit", context = %context, "{message}");
        }
    }
}

/// `k=v` pairs joined by spaces.
fn render_context(context: &[(&str, &str)]) -> String {
    context
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_renders_as_pairs() {
        let rendered = render_context(&[("identity", "github"), ("step", "callback")]);
        assert_eq!(rendered, "identity=github step=callback");
    }

    #[test]
    fn empty_context_renders_empty() {
        assert_eq!(render_context(&[]), "");
    }

    #[test]
    fn tracing_logger_accepts_every_level() {
        let logger = TracingLogger;
        for level in [
            Level::ERROR,
            Level::WARN,
            Level::INFO,
            Level::DEBUG,
            Level::TRACE,
        ] {
            logger.log(level, "flow step", &[("identity", "github")]);
        }
    }
}
