//! Scheme policy and the rustls connector used for HTTPS requests.

use crate::request_url::RequestUrl;
use crate::request_url::Scheme;
use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use tl_core::TallyError;
use tl_core::TallyResult;

/// Stream the HTTP client reads and writes, plain or TLS-wrapped.
pub trait IoStream: Read + Write + Send {}
impl<T> IoStream for T where T: Read + Write + Send {}

pub type BoxedIoStream = Box<dyn IoStream>;

/// Controls which trust anchors are used for server certificate verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStoreMode {
    /// Use only the embedded Mozilla/WebPKI roots.
    WebPkiOnly,
    /// Use WebPKI roots and merge operating-system roots (enterprise/local CAs).
    WebPkiAndOs,
}

/// Decides which request URLs may leave the process and how HTTPS is
/// verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPolicy {
    /// Refuse plain HTTP unless the host is loopback.
    pub https_only: bool,
    pub allow_loopback_http: bool,
    pub trust_store_mode: TrustStoreMode,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            https_only: true,
            allow_loopback_http: true,
            trust_store_mode: TrustStoreMode::WebPkiOnly,
        }
    }
}

impl TransportPolicy {
    pub fn permissive() -> Self {
        Self {
            https_only: false,
            ..Self::default()
        }
    }

    pub fn with_trust_store_mode(mut self, mode: TrustStoreMode) -> Self {
        self.trust_store_mode = mode;
        self
    }

    pub fn check(&self, url: &RequestUrl) -> TallyResult<()> {
        match url.scheme() {
            Scheme::Https => Ok(()),
            Scheme::Http if !self.https_only => Ok(()),
            Scheme::Http if self.allow_loopback_http && url.is_loopback() => Ok(()),
            Scheme::Http => Err(TallyError::new(
                "net.tls.https_only",
                format!("HTTPS-only mode blocks plain HTTP request to `{}`", url.host()),
            )),
        }
    }
}

#[cfg(feature = "tls-rustls")]
pub(crate) fn connect_tls(
    mut stream: TcpStream,
    url: &RequestUrl,
    policy: &TransportPolicy,
) -> TallyResult<BoxedIoStream> {
    use rustls::ClientConfig;
    use rustls::ClientConnection;
    use rustls::StreamOwned;
    use rustls::pki_types::ServerName;
    use std::sync::Arc;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let roots = root_store(policy)?;
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|error| {
            TallyError::new(
                "net.tls.config_versions_invalid",
                format!("failed to configure TLS protocol versions: {error}"),
            )
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let host = url.host_for_connect().to_owned();
    let server_name = ServerName::try_from(host.clone()).map_err(|error| {
        TallyError::new(
            "net.tls.server_name_invalid",
            format!("invalid TLS server name `{host}`: {error}"),
        )
    })?;

    let mut connection = ClientConnection::new(Arc::new(config), server_name).map_err(|error| {
        TallyError::new(
            "net.tls.connection_init_failed",
            format!("failed to initialize TLS connection for `{host}`: {error}"),
        )
    })?;

    connection.complete_io(&mut stream).map_err(|error| {
        TallyError::new(
            "net.tls.handshake_failed",
            format!("TLS handshake failed for `{host}`: {error}"),
        )
    })?;

    Ok(Box::new(StreamOwned::new(connection, stream)))
}

#[cfg(feature = "tls-rustls")]
fn root_store(policy: &TransportPolicy) -> TallyResult<rustls::RootCertStore> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if matches!(policy.trust_store_mode, TrustStoreMode::WebPkiAndOs) {
        let native = rustls_native_certs::load_native_certs();
        if native.certs.is_empty() && !native.errors.is_empty() {
            let details = native
                .errors
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TallyError::new(
                "net.tls.os_roots_load_failed",
                format!("failed to load operating-system roots: {details}"),
            ));
        }

        for cert in native.certs {
            roots.add(cert).map_err(|error| {
                TallyError::new(
                    "net.tls.os_root_add_failed",
                    format!("failed to add operating-system root: {error}"),
                )
            })?;
        }
    }

    if roots.is_empty() {
        return Err(TallyError::new(
            "net.tls.root_store_empty",
            "no trust anchors available for TLS verification",
        ));
    }

    Ok(roots)
}

#[cfg(not(feature = "tls-rustls"))]
pub(crate) fn connect_tls(
    _stream: TcpStream,
    _url: &RequestUrl,
    _policy: &TransportPolicy,
) -> TallyResult<BoxedIoStream> {
    Err(TallyError::new(
        "net.tls.backend_unavailable",
        "rustls backend is disabled for this build; enable `tl-net/tls-rustls`",
    ))
}
