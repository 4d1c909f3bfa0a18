use std::time::Duration;

use bytes::Bytes;
use rand::Rng as _;

use super::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Uniform pause between a virtual user's consecutive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    min: Duration,
    max: Duration,
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidThinkTime { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::rng().random_range(self.min..=self.max)
    }
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Hard cap on concurrently live virtual users.
    pub max_vus: u64,
    /// Reconciliation interval of the run driver.
    pub tick: Duration,
    pub think_time: ThinkTime,
    /// How long to wait for in-flight requests after stop before aborting workers.
    pub graceful_stop: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_vus: 50,
            tick: Duration::from_secs(1),
            think_time: ThinkTime::default(),
            graceful_stop: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_vus == 0 {
            return Err(Error::InvalidMaxVus);
        }
        if self.tick.is_zero() {
            return Err(Error::InvalidTick);
        }
        if self.think_time.min > self.think_time.max {
            return Err(Error::InvalidThinkTime {
                min: self.think_time.min,
                max: self.think_time.max,
            });
        }
        Ok(())
    }
}

/// The one request every virtual user sends, built once from configuration.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
}

impl RequestTemplate {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
