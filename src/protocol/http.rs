// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP transport for the gateway's web interface.

use std::time::Duration;

use reqwest::Client;

use crate::error::TransportError;
use crate::protocol::{Endpoint, Request, Response, Transport};

// ============================================================================
// GatewayConfig - Where and how to reach the gateway
// ============================================================================

/// Configuration of the gateway's web interface.
///
/// # Examples
///
/// ```
/// use smarthome_lp::protocol::GatewayConfig;
/// use std::time::Duration;
///
/// // Defaults
/// let config = GatewayConfig::new();
///
/// // Local mirror with a session cookie
/// let config = GatewayConfig::new()
///     .with_base_url("http://127.0.0.1:8080")
///     .with_header("Cookie", "ASP.NET_SessionId=abc")
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    base_url: String,
    poll_path: String,
    get_value_path: String,
    set_value_path: String,
    logout_path: String,
    timeout: Duration,
    headers: Vec<(String, String)>,
}

impl GatewayConfig {
    /// Default base URL of the hosted web interface.
    pub const DEFAULT_BASE_URL: &'static str = "https://mobile.rwe-smarthome.de";
    /// Default long polling path.
    pub const DEFAULT_POLL_PATH: &'static str = "/MobileWeb/LongPolling/GetChanges";
    /// Default get-value path.
    pub const DEFAULT_GET_VALUE_PATH: &'static str = "/MobileWeb/JsonApi/GetLogicalDeviceState";
    /// Default set-value path.
    pub const DEFAULT_SET_VALUE_PATH: &'static str = "/MobileWeb/JsonApi/SetActuatorValue/";
    /// Default logout path.
    pub const DEFAULT_LOGOUT_PATH: &'static str = "/MobileWeb/Logon/LogOff";
    /// Default timeout for requests other than long polls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration with the default endpoints.
    #[must_use]
    pub fn new() -> Self {
        let base_url = Self::DEFAULT_BASE_URL.to_string();
        Self {
            headers: default_headers(&base_url),
            base_url,
            poll_path: Self::DEFAULT_POLL_PATH.to_string(),
            get_value_path: Self::DEFAULT_GET_VALUE_PATH.to_string(),
            set_value_path: Self::DEFAULT_SET_VALUE_PATH.to_string(),
            logout_path: Self::DEFAULT_LOGOUT_PATH.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the base URL. A trailing slash is removed.
    ///
    /// The `Referer` header follows the new base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.headers.retain(|(name, _)| name != "Referer");
        self.headers
            .push(("Referer".to_string(), referer(&base_url)));
        self.base_url = base_url;
        self
    }

    /// Sets the path of one endpoint.
    #[must_use]
    pub fn with_path(mut self, endpoint: Endpoint, path: impl Into<String>) -> Self {
        let path = path.into();
        match endpoint {
            Endpoint::LongPoll => self.poll_path = path,
            Endpoint::GetValue => self.get_value_path = path,
            Endpoint::SetValue => self.set_value_path = path,
            Endpoint::Logout => self.logout_path = path,
        }
        self
    }

    /// Sets the timeout for requests that do not carry their own.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request, replacing one of the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value.into()));
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the path of an endpoint.
    #[must_use]
    pub fn path(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::LongPoll => &self.poll_path,
            Endpoint::GetValue => &self.get_value_path,
            Endpoint::SetValue => &self.set_value_path,
            Endpoint::Logout => &self.logout_path,
        }
    }

    /// Returns the default request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the headers sent with every request.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Creates an `HttpTransport` with a fresh cookie-aware client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_transport(self) -> Result<HttpTransport, TransportError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(TransportError::Http)?;
        Ok(HttpTransport::with_client(self, client))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn referer(base_url: &str) -> String {
    format!("{base_url}/MobileWeb/OverviewAndControl")
}

fn default_headers(base_url: &str) -> Vec<(String, String)> {
    vec![
        ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
        (
            "Accept".to_string(),
            "application/json, text/javascript, */*".to_string(),
        ),
        (
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        ),
        ("Referer".to_string(), referer(base_url)),
    ]
}

// ============================================================================
// HttpTransport - reqwest-backed Transport
// ============================================================================

/// HTTP transport bound to one gateway session.
///
/// The session lives in the client's cookie store or in a `Cookie` header
/// of the configuration, so an already authenticated `reqwest::Client` can
/// be passed to [`with_client`](Self::with_client).
///
/// # Examples
///
/// ```no_run
/// use smarthome_lp::protocol::{GatewayConfig, Request, TimestampGenerator, Transport};
///
/// # async fn example() -> Result<(), smarthome_lp::error::TransportError> {
/// let transport = GatewayConfig::new().into_transport()?;
/// let timestamps = TimestampGenerator::new();
/// let response = transport
///     .send(Request::get_value(timestamps.next(), "device-id"))
///     .await?;
/// println!("{}", response.body);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: GatewayConfig,
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, TransportError> {
        GatewayConfig::new().into_transport()
    }

    /// Creates a transport from an existing, usually authenticated, client.
    #[must_use]
    pub fn with_client(config: GatewayConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Builds the URL for a request.
    fn build_url(&self, request: &Request) -> String {
        let query = request
            .params
            .iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}{}?{query}",
            self.config.base_url,
            self.config.path(request.endpoint)
        )
    }
}

/// Maps a reqwest failure to the transport error classes.
fn classify(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::ConnectionRefused(error.to_string())
    } else {
        TransportError::Http(error)
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = self.build_url(&request);
        let timeout = request.timeout.unwrap_or(self.config.timeout);

        tracing::debug!(url = %url, timeout_ms = timeout.as_millis(), "Sending HTTP request");

        let mut builder = self.client.get(&url).timeout(timeout);
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(e, timeout))?;

        tracing::debug!(status, body = %body, "Received HTTP response");

        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base_url: &str) -> HttpTransport {
        GatewayConfig::new()
            .with_base_url(base_url)
            .into_transport()
            .unwrap()
    }

    #[test]
    fn build_url_for_long_poll() {
        let transport = transport("http://gateway.local");
        let request = Request::long_poll(42, "abc", Duration::from_secs(35));
        assert_eq!(
            transport.build_url(&request),
            "http://gateway.local/MobileWeb/LongPolling/GetChanges?_=42&sessionId=abc"
        );
    }

    #[test]
    fn build_url_encodes_values() {
        let transport = transport("http://gateway.local/");
        let request = Request::get_value(1, "a b/c");
        assert_eq!(
            transport.build_url(&request),
            "http://gateway.local/MobileWeb/JsonApi/GetLogicalDeviceState\
             ?_=1&Id=a%20b%2Fc&IsResolveRequired=true&Value=null&Metadata="
        );
    }

    #[test]
    fn build_url_with_custom_path() {
        let transport = HttpTransport::with_client(
            GatewayConfig::new()
                .with_base_url("http://gateway.local")
                .with_path(Endpoint::Logout, "/logout"),
            Client::new(),
        );
        assert_eq!(
            transport.build_url(&Request::logout(7)),
            "http://gateway.local/logout?_=7"
        );
    }

    // =========================================================================
    // GatewayConfig tests
    // =========================================================================

    #[test]
    fn gateway_config_default_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.base_url(), "https://mobile.rwe-smarthome.de");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(
            config.path(Endpoint::SetValue),
            "/MobileWeb/JsonApi/SetActuatorValue/"
        );
        assert!(
            config
                .headers()
                .iter()
                .any(|(name, value)| name == "X-Requested-With" && value == "XMLHttpRequest")
        );
    }

    #[test]
    fn gateway_config_referer_follows_base_url() {
        let config = GatewayConfig::new().with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        let referers: Vec<_> = config
            .headers()
            .iter()
            .filter(|(name, _)| name == "Referer")
            .collect();
        assert_eq!(referers.len(), 1);
        assert_eq!(referers[0].1, "http://127.0.0.1:9000/MobileWeb/OverviewAndControl");
    }

    #[test]
    fn gateway_config_with_header_replaces() {
        let config = GatewayConfig::new()
            .with_header("Cookie", "a=1")
            .with_header("Cookie", "a=2");
        let cookies: Vec<_> = config
            .headers()
            .iter()
            .filter(|(name, _)| name == "Cookie")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(cookies, vec!["a=2"]);
    }

    #[test]
    fn gateway_config_with_timeout() {
        let config = GatewayConfig::new().with_timeout(Duration::from_secs(3));
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }
}
