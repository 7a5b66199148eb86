//! Trace configuration: the `otter_opt_t` equivalent.
//!
//! Environment/option parsing is an external-collaborator concern per
//! spec.md §1, so this module stays intentionally thin: read a handful of
//! environment variables, apply defaults, done. Variable names and defaults
//! are taken from the original's call sites in `otterTraceInitialise`.

use std::env;
use std::path::PathBuf;

pub const ENV_TRACE_OUTPUT: &str = "OTTER_TRACE_OUTPUT";
pub const ENV_TRACE_PATH: &str = "OTTER_TRACE_PATH";
pub const ENV_APPEND_HOSTNAME: &str = "OTTER_APPEND_HOSTNAME";

const DEFAULT_TRACE_OUTPUT: &str = "trace";
const DEFAULT_TRACE_PATH: &str = "otter-trace";

/// Which instrumentation surface produced the events in this archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventModel {
    Omp,
    Serial,
    TaskGraph,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub hostname: String,
    pub tracename: String,
    pub tracepath: PathBuf,
    pub archive_name: String,
    pub append_hostname: bool,
    pub event_model: EventModel,
}

impl Options {
    /// Builds `Options` for the given event model, reading the same
    /// environment variables `otterTraceInitialise` does and falling back to
    /// the same defaults when unset.
    pub fn from_env(event_model: EventModel) -> Self {
        let tracename =
            env::var(ENV_TRACE_OUTPUT).unwrap_or_else(|_| DEFAULT_TRACE_OUTPUT.to_owned());
        let tracepath =
            env::var(ENV_TRACE_PATH).unwrap_or_else(|_| DEFAULT_TRACE_PATH.to_owned());
        let append_hostname = env::var(ENV_APPEND_HOSTNAME).is_ok();
        let hostname = os_hostname();

        let archive_name = if append_hostname {
            format!("{}-{}", tracename, hostname)
        } else {
            tracename.clone()
        };

        Options {
            hostname,
            tracename,
            tracepath: PathBuf::from(tracepath),
            archive_name,
            append_hostname,
            event_model,
        }
    }
}

/// Best-effort OS hostname lookup, matching the original's `gethostname(2)`
/// call. No crate in this corpus is dedicated purely to hostname lookup, so
/// we fall back through the environment, as most POSIX shells (and the
/// `HOSTNAME` variable convention) already do.
fn os_hostname() -> String {
    env::var("HOSTNAME")
        .or_else(|_| env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        env::remove_var(ENV_TRACE_OUTPUT);
        env::remove_var(ENV_TRACE_PATH);
        env::remove_var(ENV_APPEND_HOSTNAME);
        let opts = Options::from_env(EventModel::TaskGraph);
        assert_eq!(opts.tracename, DEFAULT_TRACE_OUTPUT);
        assert_eq!(opts.tracepath, PathBuf::from(DEFAULT_TRACE_PATH));
        assert!(!opts.append_hostname);
        assert_eq!(opts.archive_name, DEFAULT_TRACE_OUTPUT);
    }

    #[test]
    #[serial]
    fn append_hostname_suffixes_archive_name() {
        env::set_var(ENV_TRACE_OUTPUT, "mytrace");
        env::set_var(ENV_APPEND_HOSTNAME, "1");
        let opts = Options::from_env(EventModel::Omp);
        assert!(opts.archive_name.starts_with("mytrace-"));
        env::remove_var(ENV_TRACE_OUTPUT);
        env::remove_var(ENV_APPEND_HOSTNAME);
    }
}
