//! Request target parsing and resolution.

use std::net::IpAddr;
use tl_core::TallyError;
use tl_core::TallyResult;
use url::Url;

/// Supported request schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Https)
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// Absolute URL an HTTP request can be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    parsed: Url,
    scheme: Scheme,
    host: String,
    port: u16,
}

impl RequestUrl {
    pub fn parse(input: &str) -> TallyResult<Self> {
        let parsed = Url::parse(input).map_err(|error| {
            TallyError::new(
                "net.url.invalid",
                format!("failed to parse URL `{input}`: {error}"),
            )
        })?;
        Self::from_url(parsed)
    }

    /// Resolves `href` (absolute or relative, as found in a form `action`)
    /// against the page location `base`.
    pub fn resolve(base: &str, href: &str) -> TallyResult<Self> {
        let base = Url::parse(base).map_err(|error| {
            TallyError::new(
                "net.url.invalid_base",
                format!("failed to parse base URL `{base}`: {error}"),
            )
        })?;
        let joined = base.join(href).map_err(|error| {
            TallyError::new(
                "net.url.invalid",
                format!("failed to resolve `{href}` against `{base}`: {error}"),
            )
        })?;
        Self::from_url(joined)
    }

    fn from_url(mut parsed: Url) -> TallyResult<Self> {
        if parsed.cannot_be_a_base() {
            return Err(TallyError::new(
                "net.url.invalid_base",
                "URL cannot be used as a request target",
            ));
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(TallyError::new(
                "net.url.credentials_disallowed",
                "URL userinfo (`username:password@`) is not allowed",
            ));
        }

        let scheme = match parsed.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(TallyError::new(
                    "net.url.scheme_unsupported",
                    format!("unsupported scheme `{other}`"),
                ));
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| TallyError::new("net.url.host_missing", "URL must include a host"))?
            .to_ascii_lowercase();

        let port = parsed.port_or_known_default().ok_or_else(|| {
            TallyError::new(
                "net.url.port_missing",
                "unable to determine effective port for URL",
            )
        })?;

        // Fragments never go on the wire.
        parsed.set_fragment(None);

        Ok(Self {
            parsed,
            scheme,
            host,
            port,
        })
    }

    pub fn as_str(&self) -> &str {
        self.parsed.as_str()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host without IPv6 brackets, suitable for DNS lookup and SNI.
    pub fn host_for_connect(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }

    pub fn is_loopback(&self) -> bool {
        let host = self.host_for_connect();
        host == "localhost"
            || host.ends_with(".localhost")
            || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
    }

    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn path_and_query(&self) -> String {
        let path = if self.parsed.path().is_empty() {
            "/"
        } else {
            self.parsed.path()
        };

        match self.parsed.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        }
    }
}
