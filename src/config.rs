//! Process-wide gateway configuration.
//!
//! [`GatewayConfig`] carries the safety budgets and agentic-search defaults
//! shared by every response. It is constructed once at startup (builder with
//! validation, environment-variable overrides) and read-only afterwards.
//!
//! ## Environment Variables
//!
//! - `RESPONSE_GATEWAY_MAX_TOOL_CALLS`: override the tool-call budget
//! - `RESPONSE_GATEWAY_MAX_DURATION_SECS`: override the wall-clock budget
//! - `RESPONSE_GATEWAY_SEED_MULTIPLIER`: override the initial seed multiplier
//! - `RESPONSE_GATEWAY_ALPHA`: override the hybrid-seed mixing parameter
//!
//! # Examples
//!
//! ```rust
//! use response_gateway::GatewayConfig;
//! use std::time::Duration;
//!
//! let config = GatewayConfig::builder()
//!     .max_tool_calls(20)
//!     .max_duration(Duration::from_secs(120))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_tool_calls(), 20);
//! ```

use crate::{Error, Result};
use std::env;
use std::time::Duration;

/// Per-request tuning toggles for the agentic-search hyperparameter tuner.
///
/// Each flag gates one sampling parameter; a disabled flag freezes that
/// parameter at its current value across iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningFlags {
    /// Allow the tuner to move `temperature`.
    pub temperature: bool,
    /// Allow the tuner to move `top_p`.
    pub top_p: bool,
    /// Allow the tuner to move `presence_penalty`.
    pub presence_penalty: bool,
    /// Allow the tuner to move `frequency_penalty`.
    pub frequency_penalty: bool,
}

impl Default for TuningFlags {
    fn default() -> Self {
        Self {
            temperature: true,
            top_p: true,
            presence_penalty: true,
            frequency_penalty: true,
        }
    }
}

/// Validated process-wide configuration for the gateway core.
///
/// Construct with [`GatewayConfig::builder`]; every field is range-checked at
/// build time so the orchestrator and search engine never re-validate.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Total tool executions permitted per response (1..=100).
    max_tool_calls: u32,

    /// Wall-clock budget per response, measured from the `created` snapshot
    /// (1s..=10m).
    max_duration: Duration,

    /// Grace window a cancelled tool gets to observe cancellation before its
    /// outcome is synthesized as `tool-cancelled`.
    tool_grace: Duration,

    /// Multiplier applied to `max_results` for the agentic-search pre-seed
    /// fetch (1..=10). The seed k is capped at 100.
    initial_seed_multiplier: usize,

    /// Default dense/lexical mixing parameter for the hybrid seed strategy
    /// (0.0..=1.0, 1.0 = dense only).
    alpha_default: f64,

    /// Default tuner toggles; per-request overrides come from the
    /// agentic-search tool definition.
    tuning: TuningFlags,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 10,
            max_duration: Duration::from_secs(60),
            tool_grace: Duration::from_secs(5),
            initial_seed_multiplier: 3,
            alpha_default: 0.5,
            tuning: TuningFlags::default(),
        }
    }
}

impl GatewayConfig {
    /// Creates a new builder with the default budgets.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Builds a configuration from defaults plus `RESPONSE_GATEWAY_*`
    /// environment overrides.
    ///
    /// Unparseable or out-of-range values are rejected rather than silently
    /// ignored.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Ok(raw) = env::var("RESPONSE_GATEWAY_MAX_TOOL_CALLS") {
            let value = raw.parse::<u32>().map_err(|_| {
                Error::config(format!("RESPONSE_GATEWAY_MAX_TOOL_CALLS: not an integer: {raw}"))
            })?;
            builder = builder.max_tool_calls(value);
        }

        if let Ok(raw) = env::var("RESPONSE_GATEWAY_MAX_DURATION_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                Error::config(format!(
                    "RESPONSE_GATEWAY_MAX_DURATION_SECS: not an integer: {raw}"
                ))
            })?;
            builder = builder.max_duration(Duration::from_secs(secs));
        }

        if let Ok(raw) = env::var("RESPONSE_GATEWAY_SEED_MULTIPLIER") {
            let value = raw.parse::<usize>().map_err(|_| {
                Error::config(format!("RESPONSE_GATEWAY_SEED_MULTIPLIER: not an integer: {raw}"))
            })?;
            builder = builder.initial_seed_multiplier(value);
        }

        if let Ok(raw) = env::var("RESPONSE_GATEWAY_ALPHA") {
            let value = raw.parse::<f64>().map_err(|_| {
                Error::config(format!("RESPONSE_GATEWAY_ALPHA: not a number: {raw}"))
            })?;
            builder = builder.alpha_default(value);
        }

        builder.build()
    }

    /// Returns the per-response tool-call budget.
    pub fn max_tool_calls(&self) -> u32 {
        self.max_tool_calls
    }

    /// Returns the per-response wall-clock budget.
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Returns the tool cancellation grace window.
    pub fn tool_grace(&self) -> Duration {
        self.tool_grace
    }

    /// Returns the pre-seed multiplier for agentic search.
    pub fn initial_seed_multiplier(&self) -> usize {
        self.initial_seed_multiplier
    }

    /// Returns the default hybrid mixing parameter.
    pub fn alpha_default(&self) -> f64 {
        self.alpha_default
    }

    /// Returns the default tuner toggles.
    pub fn tuning(&self) -> TuningFlags {
        self.tuning
    }

    /// Clamps a per-request tool-call budget override to the configured range.
    ///
    /// A request may lower its own budget freely (including to 0, which makes
    /// any tool call fail the budget check); raising it beyond the process
    /// limit is not permitted.
    pub fn effective_max_tool_calls(&self, request_override: Option<u32>) -> u32 {
        match request_override {
            Some(value) => value.min(self.max_tool_calls),
            None => self.max_tool_calls,
        }
    }
}

/// Builder for [`GatewayConfig`] with range validation.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    max_tool_calls: Option<u32>,
    max_duration: Option<Duration>,
    tool_grace: Option<Duration>,
    initial_seed_multiplier: Option<usize>,
    alpha_default: Option<f64>,
    tuning: Option<TuningFlags>,
}

impl GatewayConfigBuilder {
    /// Sets the per-response tool-call budget (1..=100).
    pub fn max_tool_calls(mut self, value: u32) -> Self {
        self.max_tool_calls = Some(value);
        self
    }

    /// Sets the per-response wall-clock budget (1s..=10m).
    pub fn max_duration(mut self, value: Duration) -> Self {
        self.max_duration = Some(value);
        self
    }

    /// Sets the tool cancellation grace window.
    pub fn tool_grace(mut self, value: Duration) -> Self {
        self.tool_grace = Some(value);
        self
    }

    /// Sets the pre-seed multiplier (1..=10).
    pub fn initial_seed_multiplier(mut self, value: usize) -> Self {
        self.initial_seed_multiplier = Some(value);
        self
    }

    /// Sets the default hybrid mixing parameter (0.0..=1.0).
    pub fn alpha_default(mut self, value: f64) -> Self {
        self.alpha_default = Some(value);
        self
    }

    /// Sets the default tuner toggles.
    pub fn tuning(mut self, flags: TuningFlags) -> Self {
        self.tuning = Some(flags);
        self
    }

    /// Validates ranges and builds the final [`GatewayConfig`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error when any value falls outside its
    /// documented range.
    pub fn build(self) -> Result<GatewayConfig> {
        let defaults = GatewayConfig::default();

        let max_tool_calls = self.max_tool_calls.unwrap_or(defaults.max_tool_calls);
        if !(1..=100).contains(&max_tool_calls) {
            return Err(Error::config("max_tool_calls must be between 1 and 100"));
        }

        let max_duration = self.max_duration.unwrap_or(defaults.max_duration);
        if max_duration < Duration::from_secs(1) || max_duration > Duration::from_secs(600) {
            return Err(Error::config("max_duration must be between 1s and 10m"));
        }

        let tool_grace = self.tool_grace.unwrap_or(defaults.tool_grace);
        if tool_grace.is_zero() {
            return Err(Error::config("tool_grace must be non-zero"));
        }

        let initial_seed_multiplier = self
            .initial_seed_multiplier
            .unwrap_or(defaults.initial_seed_multiplier);
        if !(1..=10).contains(&initial_seed_multiplier) {
            return Err(Error::config(
                "initial_seed_multiplier must be between 1 and 10",
            ));
        }

        let alpha_default = self.alpha_default.unwrap_or(defaults.alpha_default);
        if !(0.0..=1.0).contains(&alpha_default) {
            return Err(Error::config("alpha_default must be between 0.0 and 1.0"));
        }

        Ok(GatewayConfig {
            max_tool_calls,
            max_duration,
            tool_grace,
            initial_seed_multiplier,
            alpha_default,
            tuning: self.tuning.unwrap_or(defaults.tuning),
        })
    }
}
