// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; binaries and tests call [`init`]
//! once to see them. `RUST_LOG` overrides the configured level.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `"info"` or `"warn,gg_kvcache=debug"`.
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self.ansi = false;
        self
    }

    pub fn no_color(mut self) -> Self {
        self.ansi = false;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install a global subscriber writing to stderr. Later calls are no-ops.
pub fn init(config: LoggingConfig) {
    INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(config.filter())
            .with_writer(std::io::stderr)
            .with_target(true);
        // Another subscriber may already be set (e.g. by a test harness).
        let _ = match config.format {
            LogFormat::Text => builder.with_ansi(config.ansi).try_init(),
            LogFormat::Json => builder.json().with_ansi(false).try_init(),
        };
    });
}

/// Plain text logging at `level`.
pub fn init_stderr(level: &str) {
    init(LoggingConfig::new(level));
}
