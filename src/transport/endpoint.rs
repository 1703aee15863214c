use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::ConfigError;

/// URL scheme used to reach the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    Wss,
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
            Self::Http => "http",
            Self::Https => "https",
        };
        f.write_str(s)
    }
}

/// Address + path + optional sub-protocol of the remote listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub scheme: Scheme,
    /// Host with optional port, e.g. `192.168.2.1:8089`
    pub address: String,
    /// Request path, always starting with `/`
    pub path: String,
    /// Value for `Sec-WebSocket-Protocol`, if any
    pub subprotocol: Option<String>,
}

impl Endpoint {
    /// Build and validate an endpoint.
    pub fn new(
        scheme: Scheme,
        address: impl Into<String>,
        path: impl Into<String>,
        subprotocol: Option<String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = Self {
            scheme,
            address: address.into().trim().to_string(),
            path: path.into().trim().to_string(),
            subprotocol: subprotocol.filter(|p| !p.trim().is_empty()),
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.address, self.path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::InvalidAddress("address is empty".to_string()));
        }
        if self.address.contains("://") || self.address.contains('/') {
            return Err(ConfigError::InvalidAddress(format!(
                "{} (expected host[:port] without scheme or path)",
                self.address
            )));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(format!(
                "{} (must start with '/')",
                self.path
            )));
        }

        let url = self.url();
        let uri: Uri = url
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(format!("{url}: {e}")))?;
        if uri.host().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidAddress(format!("{url}: missing host")));
        }

        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())?;
        if let Some(protocol) = &self.subprotocol {
            write!(f, " ({protocol})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_from_parts() {
        let ep = Endpoint::new(Scheme::Wss, "192.168.2.1:8089", "/audio", Some("audio-protocol".into()))
            .unwrap();
        assert_eq!(ep.url(), "wss://192.168.2.1:8089/audio");
        assert_eq!(ep.subprotocol.as_deref(), Some("audio-protocol"));
    }

    #[test]
    fn rejects_scheme_in_address() {
        let err = Endpoint::new(Scheme::Ws, "ws://host", "/", None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress(_)));
    }

    #[test]
    fn rejects_relative_path() {
        let err = Endpoint::new(Scheme::Ws, "host:1", "audio", None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath(_)));
    }

    #[test]
    fn rejects_empty_address_and_blank_subprotocol() {
        assert!(Endpoint::new(Scheme::Ws, "  ", "/", None).is_err());
        let ep = Endpoint::new(Scheme::Ws, "host", "/", Some(" ".into())).unwrap();
        assert_eq!(ep.subprotocol, None);
    }
}
