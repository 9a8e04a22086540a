//! Networking contracts: request URLs, HTTP messages, form bodies, and a
//! blocking HTTP/1.1 client.

pub mod client;
pub mod form;
pub mod http;
pub mod request_url;
pub mod tls;

use client::HttpClient;
use tl_core::TallyResult;

pub use form::FORM_URLENCODED;
pub use form::FormBody;
pub use http::Header;
pub use http::HttpMethod;
pub use http::HttpRequest;
pub use http::HttpRequestBuilder;
pub use http::HttpResponse;
pub use http::HttpStatusCode;
pub use http::HttpVersion;
pub use request_url::RequestUrl;
pub use request_url::Scheme;
pub use tls::TransportPolicy;
pub use tls::TrustStoreMode;

const DEFAULT_USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));
const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Entry point for building and sending requests under one transport policy.
#[derive(Debug, Clone, Default)]
pub struct NetStack {
    pub policy: TransportPolicy,
}

impl NetStack {
    pub fn new(policy: TransportPolicy) -> Self {
        Self { policy }
    }

    /// Starts a request to `url` with the stack's default headers, refusing
    /// targets the policy does not allow.
    pub fn prepare(&self, method: HttpMethod, url: RequestUrl) -> TallyResult<HttpRequestBuilder> {
        self.policy.check(&url)?;

        HttpRequest::builder(method, url)
            .header("User-Agent", DEFAULT_USER_AGENT)?
            .header("Accept-Encoding", DEFAULT_ACCEPT_ENCODING)
    }

    pub fn client(&self) -> HttpClient {
        HttpClient::new(self.policy.clone())
    }
}
