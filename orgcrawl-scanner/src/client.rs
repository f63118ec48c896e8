use crate::error::{FetchError, Result};
use encoding_rs::{Encoding, UTF_8};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, warn};

/// How far into a body to look for a `<meta>` charset declaration.
const META_SNIFF_BYTES: usize = 1024;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/75.0.3770.142 Safari/537.36";

/// Timeout and retry settings applied to every GET.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// HTTP client for the portal. One request in flight at a time.
#[derive(Clone)]
pub struct PortalClient {
    client: Client,
    policy: FetchPolicy,
}

impl PortalClient {
    pub fn new(user_agent: &str, cookie: Option<&str>, policy: FetchPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| FetchError::Client(format!("invalid cookie header: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(policy.timeout)
            .connect_timeout(policy.timeout / 2)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// GET `url` with `query` and return the decoded body.
    ///
    /// Retryable failures are attempted again after `backoff * 2^attempt`;
    /// the last error is returned once the budget is spent.
    pub async fn get_html(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.get_once(url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.policy.retries => {
                    let delay = self.policy.backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        debug!("Fetching {}", url);

        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(header_charset)
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        Ok(decode_body(&bytes, declared.as_deref()))
    }
}

/// Decode a page body. The charset comes from the `Content-Type` header,
/// then from a `<meta>` declaration near the top of the page, then UTF-8.
/// A byte order mark overrides all three.
fn decode_body(bytes: &[u8], declared: Option<&str>) -> String {
    let encoding = declared
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| meta_charset(bytes))
        .unwrap_or(UTF_8);

    let (text, used, malformed) = encoding.decode(bytes);
    if malformed {
        debug!(encoding = used.name(), "Body held bytes invalid in its charset");
    }
    text.into_owned()
}

fn header_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c: char| c == '"' || c == '\''))
    })
}

/// Covers both `<meta charset="gbk">` and the `http-equiv` form.
fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    head.match_indices("charset=").find_map(|(at, needle)| {
        let label: String = head[at + needle.len()..]
            .trim_start_matches(|c: char| c == '"' || c == '\'' || c.is_ascii_whitespace())
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | ':' | '.'))
            .collect();
        Encoding::for_label(label.as_bytes())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn fast_policy(retries: u32) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(5),
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_sends_fixed_headers_and_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/module/xxgk/search.jsp"))
            .and(header("user-agent", "orgcrawl-test"))
            .and(header("cookie", "session=abc"))
            .and(query_param("currpage", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = PortalClient::new("orgcrawl-test", Some("session=abc"), fast_policy(0)).unwrap();
        let url = format!("{}/module/xxgk/search.jsp", mock_server.uri());
        let body = client
            .get_html(&url, &[("currpage", "2".to_string())])
            .await
            .unwrap();

        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_gives_up() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = PortalClient::new(DEFAULT_USER_AGENT, None, fast_policy(2)).unwrap();
        let err = client
            .get_html(&format!("{}/down", mock_server.uri()), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = PortalClient::new(DEFAULT_USER_AGENT, None, fast_policy(3)).unwrap();
        let err = client
            .get_html(&format!("{}/missing", mock_server.uri()), &[])
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
    }

    #[test]
    fn test_header_charset_parameter() {
        assert_eq!(header_charset("text/html; charset=GBK"), Some("GBK"));
        assert_eq!(header_charset("text/html;Charset=\"utf-8\""), Some("utf-8"));
        assert_eq!(header_charset("text/html"), None);
    }

    #[test]
    fn test_meta_charset_forms() {
        let plain = br#"<html><head><meta charset="gb2312"></head>"#;
        assert_eq!(meta_charset(plain), Some(encoding_rs::GBK));

        let equiv =
            br#"<meta http-equiv="Content-Type" content="text/html; charset=GBK" />"#;
        assert_eq!(meta_charset(equiv), Some(encoding_rs::GBK));

        assert_eq!(meta_charset(b"<html><body>none</body></html>"), None);
    }

    #[test]
    fn test_undeclared_body_defaults_to_utf8() {
        assert_eq!(decode_body("市政府".as_bytes(), None), "市政府");
        assert_eq!(decode_body("市政府".as_bytes(), Some("no-such-charset")), "市政府");
    }

    #[tokio::test]
    async fn test_decodes_gbk_page_from_meta_declaration() {
        let mock_server = MockServer::start().await;

        let page = r#"<html><head><meta charset="gb2312"></head><body>市政府办公室</body></html>"#;
        let (bytes, _, _) = encoding_rs::GBK.encode(page);
        Mock::given(method("GET"))
            .and(path("/gbk"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(bytes.into_owned(), "text/html"))
            .mount(&mock_server)
            .await;

        let client = PortalClient::new(DEFAULT_USER_AGENT, None, fast_policy(0)).unwrap();
        let body = client
            .get_html(&format!("{}/gbk", mock_server.uri()), &[])
            .await
            .unwrap();

        assert!(body.contains("市政府办公室"));
    }

    #[tokio::test]
    async fn test_header_charset_wins_over_meta() {
        let mock_server = MockServer::start().await;

        let page = r#"<html><head><meta charset="utf-8"></head><body>衢州市</body></html>"#;
        let (bytes, _, _) = encoding_rs::GBK.encode(page);
        Mock::given(method("GET"))
            .and(path("/declared"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(bytes.into_owned(), "text/html; charset=gbk"),
            )
            .mount(&mock_server)
            .await;

        let client = PortalClient::new(DEFAULT_USER_AGENT, None, fast_policy(0)).unwrap();
        let body = client
            .get_html(&format!("{}/declared", mock_server.uri()), &[])
            .await
            .unwrap();

        assert!(body.contains("衢州市"));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
            .mount(&mock_server)
            .await;

        let client = PortalClient::new(DEFAULT_USER_AGENT, None, fast_policy(2)).unwrap();
        let body = client
            .get_html(&format!("{}/flaky", mock_server.uri()), &[])
            .await
            .unwrap();

        assert_eq!(body, "fine");
    }
}
