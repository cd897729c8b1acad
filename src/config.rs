//! Harness configuration from invocation arguments and the environment.
//!
//! # Sources
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Environment variables**: `HUBTEST_*`
//! 2. **Invocation arguments**: `-v` given more than once, `--debug-harness`
//! 3. **Defaults**: everything off
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `HUBTEST_VERBOSE` | `bool` | `verbose` |
//! | `HUBTEST_DEBUG` | `bool` | `debug` |

use crate::error::{Error, Result};
use std::sync::OnceLock;

/// Environment variable name for verbose mode.
pub const ENV_VERBOSE: &str = "HUBTEST_VERBOSE";
/// Environment variable name for extraction debug echoing.
pub const ENV_DEBUG: &str = "HUBTEST_DEBUG";
/// Argument enabling debug mode; stripped before further parsing.
pub const DEBUG_FLAG: &str = "--debug-harness";
/// Argument that enables verbose mode when given more than once.
pub const VERBOSE_FLAG: &str = "-v";

static GLOBAL: OnceLock<HarnessConfig> = OnceLock::new();

/// Process-wide harness switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Leave diagnostics unredirected and skip diagnostic assertions.
    pub verbose: bool,
    /// Echo every consumed diagnostic span to the real stderr.
    pub debug: bool,
}

impl HarnessConfig {
    /// Creates a configuration with everything off.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            verbose: false,
            debug: false,
        }
    }

    /// Sets verbose mode.
    #[must_use]
    pub const fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Sets debug mode.
    #[must_use]
    pub const fn debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Parses invocation arguments.
    ///
    /// Returns the configuration and the arguments with [`DEBUG_FLAG`] removed.
    #[must_use]
    pub fn from_args<I>(args: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = String>,
    {
        let mut rest: Vec<String> = args.into_iter().collect();
        let verbose = rest.iter().filter(|a| a.as_str() == VERBOSE_FLAG).count() > 1;
        let before = rest.len();
        rest.retain(|a| a != DEBUG_FLAG);
        let debug = rest.len() != before;
        (Self { verbose, debug }, rest)
    }

    /// Applies `HUBTEST_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_VERBOSE) {
            self.verbose = parse_bool(ENV_VERBOSE, &val)?;
        }
        if let Some(val) = lookup(ENV_DEBUG) {
            self.debug = parse_bool(ENV_DEBUG, &val)?;
        }
        Ok(())
    }

    /// Builds the configuration from `std::env::args()` and the environment.
    pub fn from_process() -> Result<(Self, Vec<String>)> {
        let (mut config, rest) = Self::from_args(std::env::args());
        config.apply_env_overrides()?;
        Ok((config, rest))
    }
}

/// Installs the process-wide configuration. Returns false if already set.
pub fn install(config: HarnessConfig) -> bool {
    GLOBAL.set(config).is_ok()
}

/// Returns the process-wide configuration, initialising it from the process
/// arguments and environment on first use.
pub fn global() -> HarnessConfig {
    *GLOBAL.get_or_init(|| match HarnessConfig::from_process() {
        Ok((config, _)) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring invalid harness environment");
            HarnessConfig::from_args(std::env::args()).0
        }
    })
}

fn parse_bool(var_name: &str, val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::config(format!(
            "invalid value for {var_name}: expected boolean, got {val:?}"
        ))),
    }
}
