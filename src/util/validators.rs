//! Origin and input validators used before trusting or sending anything cross-origin.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[^@]+@[^@]+\.[^@]{2,}$").unwrap());

/// `host[:port]` as exposed by `URL.host`; default ports are omitted.
fn url_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}

/// Returns `true` when both URLs share the same root domain.
///
/// Hosts are compared label by label from the right, up to the length of the shorter host,
/// so `https://shop.example.com` matches `https://pay.example.com` and `https://example.com`.
/// Scheme is ignored. Any input that does not parse as a URL fails closed.
pub fn is_root_domain_match(first: &str, second: &str) -> bool {
    let (Ok(first), Ok(second)) = (Url::parse(first), Url::parse(second)) else {
        return false;
    };

    let first_host = url_host(&first);
    let second_host = url_host(&second);
    first_host
        .rsplit('.')
        .zip(second_host.rsplit('.'))
        .all(|(left, right)| left == right)
}

/// Returns `true` when `origin` root-domain-matches any entry of `allowed`.
pub fn is_allowed_origin<S: AsRef<str>>(allowed: &[S], origin: &str) -> bool {
    allowed
        .iter()
        .any(|candidate| is_root_domain_match(candidate.as_ref(), origin))
}

pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && EMAIL_PATTERN.is_match(email)
}

/// Only `https:` redirect targets are accepted.
pub fn is_valid_redirect_uri(redirect_uri: &str) -> bool {
    Url::parse(redirect_uri)
        .map(|url| url.scheme() == "https")
        .unwrap_or(false)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginError {
    Unparsable,
    UsingLocalhost,
    NotUsingHttps,
    HasPath,
    HasHash,
    HasSearch,
}

impl OriginError {
    pub fn code_str(self) -> &'static str {
        match self {
            OriginError::Unparsable => "invalid_url",
            OriginError::UsingLocalhost => "using_localhost",
            OriginError::NotUsingHttps => "not_using_https",
            OriginError::HasPath => "has_path",
            OriginError::HasHash => "has_hash",
            OriginError::HasSearch => "has_search",
        }
    }
}

impl fmt::Display for OriginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code_str())
    }
}

impl std::error::Error for OriginError {}

/// Checks that a storefront origin is a bare `https://host` with no path, query or fragment.
pub fn validate_storefront_origin(storefront_origin: &str) -> Result<(), OriginError> {
    let url = Url::parse(storefront_origin).map_err(|_| OriginError::Unparsable)?;
    let is_loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));

    if is_loopback && url.scheme() != "https" {
        return Err(OriginError::UsingLocalhost);
    }
    if url.scheme() != "https" {
        return Err(OriginError::NotUsingHttps);
    }
    if url.path() != "/" {
        return Err(OriginError::HasPath);
    }
    if url.fragment().is_some_and(|fragment| !fragment.is_empty()) {
        return Err(OriginError::HasHash);
    }
    if url.query().is_some_and(|query| !query.is_empty()) {
        return Err(OriginError::HasSearch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_hosts_share_root() {
        assert!(is_root_domain_match("https://example.com", "http://a.b.example.com"));
        assert!(is_root_domain_match("https://accounts.shop.app", "https://shop.app"));
    }

    #[test]
    fn same_length_siblings_do_not_match() {
        assert!(!is_root_domain_match(
            "https://shop.example.com",
            "https://pay.example.com"
        ));
    }

    #[test]
    fn differing_labels_do_not_match() {
        assert!(!is_root_domain_match("https://shop.app", "https://shop.evil"));
        assert!(!is_root_domain_match(
            "https://pay.shopify.com",
            "https://pay.shopify.com.evil.io"
        ));
    }

    #[test]
    fn ports_are_part_of_the_host() {
        assert!(is_root_domain_match("https://shop.dev:8080", "https://a.shop.dev:8080"));
        assert!(!is_root_domain_match("https://shop.dev:8080", "https://shop.dev:9090"));
    }

    #[test]
    fn unparsable_inputs_fail_closed() {
        assert!(!is_root_domain_match("not a url", "https://shop.app"));
        assert!(!is_root_domain_match("https://shop.app", ""));
    }

    #[test]
    fn allow_list_accepts_any_match() {
        let allowed = ["https://shop.app", "https://pay.shopify.com"];
        assert!(is_allowed_origin(&allowed, "https://accounts.shop.app"));
        assert!(!is_allowed_origin(&allowed, "https://checkout.shopify.com"));
        assert!(!is_allowed_origin(&allowed, "https://example.org"));
        assert!(!is_allowed_origin::<&str>(&[], "https://shop.app"));
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("buyer@example.com"));
        assert!(is_valid_email("BUYER@EXAMPLE.CO"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("buyer@example.c"));
        assert!(!is_valid_email("buyer@@example.com"));
        assert!(!is_valid_email("buyer.example.com"));
    }

    #[test]
    fn redirect_uris_must_be_https() {
        assert!(is_valid_redirect_uri("https://shop.app/callback"));
        assert!(!is_valid_redirect_uri("javascript:alert(1)"));
        assert!(!is_valid_redirect_uri("http://shop.app/callback"));
    }

    #[test]
    fn storefront_origin_rules() {
        assert_eq!(validate_storefront_origin("https://store.example.com"), Ok(()));
        assert_eq!(
            validate_storefront_origin("http://localhost:3000"),
            Err(OriginError::UsingLocalhost)
        );
        assert_eq!(
            validate_storefront_origin("http://store.example.com"),
            Err(OriginError::NotUsingHttps)
        );
        assert_eq!(
            validate_storefront_origin("https://store.example.com/cart"),
            Err(OriginError::HasPath)
        );
        assert_eq!(
            validate_storefront_origin("https://store.example.com/#top"),
            Err(OriginError::HasHash)
        );
        assert_eq!(
            validate_storefront_origin("https://store.example.com/?a=1"),
            Err(OriginError::HasSearch)
        );
    }
}
