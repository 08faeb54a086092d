use super::Hub;
use crate::error::Result;

use std::env;

/// Default usable stack size per coroutine: 1 MiB.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Environment variable overriding [`DEFAULT_STACK_SIZE`], in bytes.
pub const STACK_SIZE_ENV: &str = "CORO_STACK_SIZE";

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Settings a hub is built with.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Config {
    pub(crate) stack_size: usize,
    pub(crate) event_capacity: usize,
}

/// Builder for configuring and creating a [`Hub`].
///
/// # Examples
///
/// ```rust,ignore
/// let hub = HubBuilder::new()
///     .stack_size(256 * 1024)
///     .build()?;
/// ```
#[derive(Debug)]
pub struct HubBuilder {
    config: Config,
}

impl HubBuilder {
    /// Creates a builder with default configuration.
    ///
    /// The stack size comes from the `CORO_STACK_SIZE` environment variable
    /// when it holds a positive integer, and is 1 MiB otherwise. The poller
    /// delivers up to 64 readiness events per wait.
    pub fn new() -> Self {
        let stack_size = env::var(STACK_SIZE_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|&bytes| bytes > 0)
            .unwrap_or(DEFAULT_STACK_SIZE);

        Self {
            config: Config {
                stack_size,
                event_capacity: DEFAULT_EVENT_CAPACITY,
            },
        }
    }

    /// Sets the usable stack size of every coroutine, in bytes.
    ///
    /// Rounded up to whole pages. A guard page is added on top.
    ///
    /// # Panics
    ///
    /// Panics if `bytes == 0`.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "stack_size must be > 0");

        self.config.stack_size = bytes;
        self
    }

    /// Sets how many readiness events one poller wait can deliver.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.config.event_capacity = n;
        self
    }

    /// Builds the hub.
    ///
    /// Fails if the readiness poller cannot be created.
    pub fn build(self) -> Result<Hub> {
        Hub::with_config(self.config)
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}
