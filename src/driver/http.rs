use std::collections::HashMap;
use std::time::Duration;

use crate::driver::{Driver, DriverError, DriverFactory, HttpRequest, HttpResponse};

/// Configuration for the HTTP driver.
#[derive(Debug, Clone)]
pub struct HttpDriverConfig {
    /// Base URL prepended to relative request URLs.
    pub base_url: Option<String>,
    /// Headers sent with every request.
    pub default_headers: HashMap<String, String>,
    /// Global request timeout (overridden per request when the engine's
    /// configured timeout is tighter).
    pub timeout: Duration,
}

impl Default for HttpDriverConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Driver backed by a plain `ureq` agent. Implements only the HTTP
/// capability; browser operations report unsupported so that suites mixing
/// browser steps fail with a clear message rather than hanging.
pub struct HttpDriver {
    config: HttpDriverConfig,
}

impl HttpDriver {
    pub fn new(config: HttpDriverConfig) -> Self {
        Self { config }
    }

    fn full_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_owned();
        }
        match &self.config.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), url),
            None => url.to_owned(),
        }
    }
}

impl Driver for HttpDriver {
    fn name(&self) -> &str {
        "http"
    }

    fn navigate(&mut self, _url: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("http", "navigate"))
    }

    fn click(&mut self, _selector: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("http", "click"))
    }

    fn fill(&mut self, _selector: &str, _value: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("http", "fill"))
    }

    fn select(&mut self, _selector: &str, _value: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("http", "select"))
    }

    fn hover(&mut self, _selector: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("http", "hover"))
    }

    fn wait_for(
        &mut self,
        _selector: &str,
        _state: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        Err(DriverError::unsupported("http", "wait_for"))
    }

    fn get_text(&mut self, _selector: &str) -> Result<String, DriverError> {
        Err(DriverError::unsupported("http", "get_text"))
    }

    fn get_attribute(&mut self, _selector: &str, _name: &str) -> Result<String, DriverError> {
        Err(DriverError::unsupported("http", "get_attribute"))
    }

    fn get_title(&mut self) -> Result<String, DriverError> {
        Err(DriverError::unsupported("http", "get_title"))
    }

    fn get_url(&mut self) -> Result<String, DriverError> {
        Err(DriverError::unsupported("http", "get_url"))
    }

    fn screenshot(&mut self, _full_page: bool) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::unsupported("http", "screenshot"))
    }

    fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse, DriverError> {
        let timeout = request.timeout.min(self.config.timeout);
        let config = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        let agent = ureq::Agent::new_with_config(config);
        let url = self.full_url(&request.url);

        let mut headers: Vec<(&str, &str)> = self
            .config
            .default_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        headers.extend(request.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let result = match request.method.as_str() {
            "GET" | "DELETE" | "HEAD" => {
                let mut req = match request.method.as_str() {
                    "GET" => agent.get(&url),
                    "DELETE" => agent.delete(&url),
                    _ => agent.head(&url),
                };
                for (key, value) in &headers {
                    req = req.header(*key, *value);
                }
                req.call()
            }
            "POST" | "PUT" | "PATCH" => {
                let mut req = match request.method.as_str() {
                    "POST" => agent.post(&url),
                    "PUT" => agent.put(&url),
                    _ => agent.patch(&url),
                };
                for (key, value) in &headers {
                    req = req.header(*key, *value);
                }
                match &request.body {
                    Some(body) => req.send(body.as_bytes()),
                    None => req.send_empty(),
                }
            }
            other => {
                return Err(DriverError::new(format!(
                    "unsupported HTTP method: {other}"
                )));
            }
        };

        match result {
            Ok(mut resp) => {
                let status = resp.status().as_u16();
                let mut response_headers = HashMap::new();
                for (name, value) in resp.headers() {
                    if let Ok(value) = value.to_str() {
                        response_headers.insert(name.to_string(), value.to_owned());
                    }
                }
                let body = resp
                    .body_mut()
                    .read_to_string()
                    .map_err(|e| DriverError::new(format!("failed to read response body: {e}")))?;
                Ok(HttpResponse {
                    status,
                    headers: response_headers,
                    body,
                })
            }
            Err(e) => {
                let timed_out = matches!(e, ureq::Error::Timeout(_))
                    || matches!(&e, ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut);
                Err(DriverError {
                    message: format!("HTTP request failed: {e}"),
                    detail: Some(url),
                    timed_out,
                })
            }
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        // The agent holds no long-lived session state.
        Ok(())
    }
}

/// Factory producing [`HttpDriver`] sessions.
pub struct HttpDriverFactory {
    pub config: HttpDriverConfig,
}

impl HttpDriverFactory {
    pub fn new(config: HttpDriverConfig) -> Self {
        Self { config }
    }
}

impl DriverFactory for HttpDriverFactory {
    fn create(&self) -> Result<Box<dyn Driver>, DriverError> {
        Ok(Box::new(HttpDriver::new(self.config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_with_base(base: &str) -> HttpDriver {
        HttpDriver::new(HttpDriverConfig {
            base_url: Some(base.into()),
            ..Default::default()
        })
    }

    #[test]
    fn full_url_joins_base() {
        let d = driver_with_base("http://localhost:3000/");
        assert_eq!(d.full_url("/api/users"), "http://localhost:3000/api/users");
    }

    #[test]
    fn full_url_keeps_absolute() {
        let d = driver_with_base("http://localhost:3000");
        assert_eq!(d.full_url("https://other.test/x"), "https://other.test/x");
    }

    #[test]
    fn full_url_without_base_passes_through() {
        let d = HttpDriver::new(HttpDriverConfig::default());
        assert_eq!(d.full_url("/api"), "/api");
    }

    #[test]
    fn browser_operations_are_unsupported() {
        let mut d = HttpDriver::new(HttpDriverConfig::default());
        assert!(d.click("#go").is_err());
        assert!(d.get_title().is_err());
        assert!(d.screenshot(true).is_err());
    }

    #[test]
    fn unsupported_method_errors_without_sending() {
        let mut d = HttpDriver::new(HttpDriverConfig::default());
        let err = d
            .request(&HttpRequest {
                method: "TRACE".into(),
                url: "http://127.0.0.1:1/".into(),
                headers: vec![],
                body: None,
                timeout: Duration::from_secs(1),
            })
            .unwrap_err();
        assert!(err.message.contains("unsupported HTTP method"));
    }

    #[test]
    fn connection_refused_surfaces_as_driver_error() {
        let mut d = HttpDriver::new(HttpDriverConfig::default());
        let err = d
            .request(&HttpRequest {
                method: "GET".into(),
                url: "http://127.0.0.1:19999/api".into(),
                headers: vec![],
                body: None,
                timeout: Duration::from_secs(2),
            })
            .unwrap_err();
        assert!(err.message.contains("HTTP request failed"));
    }

    #[test]
    fn factory_creates_named_driver() {
        let factory = HttpDriverFactory::new(HttpDriverConfig::default());
        let driver = factory.create().unwrap();
        assert_eq!(driver.name(), "http");
    }
}
