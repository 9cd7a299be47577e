//! Authorization domains and SDK-wide tunables.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::platform::environment::{is_spin, setting};

pub const DEFAULT_PAY_AUTH_DOMAIN: &str = "https://shop.app";
pub const DEFAULT_PAY_AUTH_DOMAIN_ALT: &str = "https://pay.shopify.com";

static SPIN_FQDN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^.]*[.]){2}(eu|us|asia).spin.dev").unwrap());

/// Origins the SDK talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthDomains {
    /// Storefront identity provider, used by proxied flows.
    pub core_auth_domain: String,
    pub pay_auth_domain: String,
    /// Alternate pay origin; outbound messages go to both pay origins during migrations.
    pub pay_auth_domain_alt: String,
}

impl AuthDomains {
    pub fn new(
        core_auth_domain: impl Into<String>,
        pay_auth_domain: impl Into<String>,
        pay_auth_domain_alt: impl Into<String>,
    ) -> Self {
        Self {
            core_auth_domain: core_auth_domain.into(),
            pay_auth_domain: pay_auth_domain.into(),
            pay_auth_domain_alt: pay_auth_domain_alt.into(),
        }
    }

    /// Resolves the domains for a page at `origin` / `hostname`.
    ///
    /// Development hosts derive every domain from their FQDN; everything else reads
    /// `CORE_AUTH_DOMAIN`, `PAY_AUTH_DOMAIN` and `PAY_AUTH_ALT_DOMAIN`, with the page origin
    /// as the core fallback.
    pub fn for_location(origin: &str, hostname: &str) -> Self {
        Self::resolve(origin, hostname, is_spin(), setting)
    }

    fn resolve<F>(origin: &str, hostname: &str, spin: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(fqdn) = dev_fqdn(hostname) {
            let core = if spin {
                format!("https://shop1.shopify.{fqdn}")
            } else {
                format!("https://shop1.my.{fqdn}")
            };
            return Self::new(
                core,
                format!("https://shop-server.{fqdn}"),
                format!("https://pay-shopify-com.{fqdn}"),
            );
        }

        Self::new(
            lookup("CORE_AUTH_DOMAIN").unwrap_or_else(|| origin.to_owned()),
            lookup("PAY_AUTH_DOMAIN").unwrap_or_else(|| DEFAULT_PAY_AUTH_DOMAIN.to_owned()),
            lookup("PAY_AUTH_ALT_DOMAIN").unwrap_or_else(|| DEFAULT_PAY_AUTH_DOMAIN_ALT.to_owned()),
        )
    }

    /// Both pay origins, primary first.
    pub fn pay_origins(&self) -> [&str; 2] {
        [&self.pay_auth_domain, &self.pay_auth_domain_alt]
    }
}

/// Development FQDN for local (`*.shop.dev`) and spin (`<a>.<b>.<region>.spin.dev`) hosts.
pub fn dev_fqdn(hostname: &str) -> Option<String> {
    if hostname.ends_with(".shop.dev") && hostname != "web-shop-client.shop.dev" {
        return Some("shop.dev".to_owned());
    }
    SPIN_FQDN
        .find(hostname)
        .map(|matched| matched.as_str().to_owned())
}

pub const DEFAULT_EMAIL_DEBOUNCE: Duration = Duration::from_millis(200);
pub const DEFAULT_PASSWORD_MANAGER_THRESHOLD: Duration = Duration::from_millis(100);
pub const DEFAULT_WINDOID_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_TREKKIE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Tunables shared by every authorize session on the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdkConfig {
    pub domains: AuthDomains,
    pub page_origin: String,
    pub email_debounce: Duration,
    pub password_manager_threshold: Duration,
    pub windoid_poll_interval: Duration,
    pub load_timeout: Duration,
    pub trekkie_timeout: Duration,
}

impl SdkConfig {
    pub fn new(domains: AuthDomains, page_origin: impl Into<String>) -> Self {
        Self {
            domains,
            page_origin: page_origin.into(),
            email_debounce: DEFAULT_EMAIL_DEBOUNCE,
            password_manager_threshold: DEFAULT_PASSWORD_MANAGER_THRESHOLD,
            windoid_poll_interval: DEFAULT_WINDOID_POLL_INTERVAL,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            trekkie_timeout: DEFAULT_TREKKIE_TIMEOUT,
        }
    }

    /// Config for a page at `page_origin`, with domains resolved from the environment.
    pub fn for_page(page_origin: &str) -> Self {
        let hostname = url::Url::parse(page_origin)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_default();
        Self::new(AuthDomains::for_location(page_origin, &hostname), page_origin)
    }
}
