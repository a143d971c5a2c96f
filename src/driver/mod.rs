pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// Capability interface for the browser/HTTP backend the engine drives.
///
/// The engine depends only on these operations; concrete backends (a real
/// browser, a plain HTTP agent, a scripted mock) live behind this trait.
/// A failing assertion is never a driver error — drivers report only I/O
/// failures.
pub trait Driver {
    /// Human-readable driver name (e.g., "http").
    fn name(&self) -> &str;

    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;
    fn click(&mut self, selector: &str) -> Result<(), DriverError>;
    fn fill(&mut self, selector: &str, value: &str) -> Result<(), DriverError>;
    fn select(&mut self, selector: &str, value: &str) -> Result<(), DriverError>;
    fn hover(&mut self, selector: &str) -> Result<(), DriverError>;

    /// Wait for a selector to reach a state ("visible", "hidden",
    /// "attached", "detached"), up to the given timeout.
    fn wait_for(&mut self, selector: &str, state: &str, timeout: Duration)
    -> Result<(), DriverError>;

    fn get_text(&mut self, selector: &str) -> Result<String, DriverError>;
    fn get_attribute(&mut self, selector: &str, name: &str) -> Result<String, DriverError>;
    fn get_title(&mut self) -> Result<String, DriverError>;
    fn get_url(&mut self) -> Result<String, DriverError>;

    /// Capture a screenshot as raw image bytes.
    fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, DriverError>;

    /// Perform an HTTP request.
    fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse, DriverError>;

    /// Tear down the session. Called exactly once at the end of a file run.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Creates one driver session per file run, lazily — only files that
/// actually contain driver-dependent steps pay the session cost.
pub trait DriverFactory {
    fn create(&self) -> Result<Box<dyn Driver>, DriverError>;
}

/// An outbound HTTP request assembled by the engine.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// An HTTP response surfaced back to assertion and value-producer blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON, or `None` when it is not valid JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// I/O failure from the browser/HTTP backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    pub detail: Option<String>,
    /// Set when the operation gave up waiting (request or wait timeout).
    pub timed_out: bool,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            timed_out: true,
        }
    }

    /// The standard error for browser operations on a driver that only
    /// implements the HTTP capability.
    pub fn unsupported(driver: &str, operation: &str) -> Self {
        Self::new(format!(
            "operation '{operation}' is not supported by the {driver} driver"
        ))
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
