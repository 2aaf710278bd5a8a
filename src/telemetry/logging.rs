//! Tracing subscriber setup

use crate::cli::Verbosity;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Overrides the verbosity-derived filter when set
pub const LOG_ENV: &str = "AUTOHEAL_LOG";

/// Filter directive for a verbosity level
pub fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "autoheal=info,warn",
        Verbosity::Verbose => "autoheal=debug,info",
        Verbosity::VeryVerbose => "autoheal=trace,debug",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// reserved for command output. Safe to call more than once.
pub fn init_tracing(verbosity: Verbosity) {
    let fallback = default_directive(verbosity);
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {} directive ({}); using {}", LOG_ENV, err, fallback);
            EnvFilter::new(fallback)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
    };

    let fmt_layer = fmt::layer()
        .with_target(matches!(verbosity, Verbosity::VeryVerbose))
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_parse() {
        for v in [Verbosity::Quiet, Verbosity::Normal, Verbosity::Verbose, Verbosity::VeryVerbose] {
            assert!(EnvFilter::try_new(default_directive(v)).is_ok());
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(Verbosity::Quiet);
        init_tracing(Verbosity::Verbose);
    }
}
