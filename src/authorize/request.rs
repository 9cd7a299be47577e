//! Caller-facing layer over the URL builder: request defaults, ux-mode adjustments and the
//! pre-auth prompt URL.

use url::form_urlencoded;

use crate::authorize::url::{build_authorize_url, AuthorizeUrlParams, UxMode};
use crate::config::SdkConfig;

pub const DEFAULT_FLOW: &str = "default";
pub const DEFAULT_FLOW_VERSION: &str = "unspecified";
pub const DEFAULT_PROMPT: &str = "login";

const LOGIN_WITH_SHOP_CONTEXT: &str = "loginWithShop";
const CLASSIC_CUSTOMER_ACCOUNTS_CONTEXT: &str = "loginWithShopClassicCustomerAccounts";

/// Redirect flows need the `query` response mode so the server redirects back with the
/// code; windoid flows always answer with a web message.
pub fn adjust_response_mode(response_mode: Option<&str>, ux_mode: Option<UxMode>) -> Option<String> {
    match ux_mode {
        Some(UxMode::Redirect) => Some("query".to_owned()),
        Some(UxMode::Windoid) => Some("web_message".to_owned()),
        _ => response_mode.map(str::to_owned),
    }
}

pub fn adjust_analytics_context(
    analytics_context: Option<&str>,
    ux_mode: Option<UxMode>,
) -> Option<String> {
    if ux_mode == Some(UxMode::Redirect) && analytics_context == Some(LOGIN_WITH_SHOP_CONTEXT) {
        return Some(CLASSIC_CUSTOMER_ACCOUNTS_CONTEXT.to_owned());
    }
    analytics_context.map(str::to_owned)
}

/// Windoid popups are unreliable on mobile browsers; those fall back to `default_ux_mode`.
pub fn adjusted_ux_mode(ux_mode: UxMode, default_ux_mode: UxMode, mobile: bool) -> UxMode {
    if ux_mode == UxMode::Windoid && mobile {
        default_ux_mode
    } else {
        ux_mode
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreAuthParams {
    pub analytics_trace_id: Option<String>,
    pub client_id: Option<String>,
    pub flow: Option<String>,
    pub flow_version: Option<String>,
    pub locale: Option<String>,
    pub storefront_domain: Option<String>,
}

/// `{pay}/accounts/pre_auth` URL used by the prompt ux role. Unset values are omitted.
pub fn build_pre_auth_url(pay_auth_domain: &str, params: &PreAuthParams, page_origin: &str) -> String {
    let entries = [
        ("analytics_trace_id", params.analytics_trace_id.as_deref()),
        ("client_id", params.client_id.as_deref()),
        ("flow", params.flow.as_deref()),
        ("flow_version", params.flow_version.as_deref()),
        ("locale", params.locale.as_deref()),
        ("target_origin", Some(page_origin)),
        ("storefront_domain", params.storefront_domain.as_deref()),
    ];

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            entries
                .iter()
                .filter_map(|(key, value)| value.map(|value| (*key, value))),
        )
        .finish();
    format!("{pay_auth_domain}/accounts/pre_auth?{query}")
}

/// Authorization request for one widget instance.
///
/// Holds the caller's parameters with request-level defaults applied. URLs are computed
/// on demand so per-call overrides (for example the prompt ux role) can be layered on top.
#[derive(Clone, Debug)]
pub struct AuthorizeRequest {
    params: AuthorizeUrlParams,
    config: SdkConfig,
    analytics_trace_id: String,
    locale: Option<String>,
}

impl AuthorizeRequest {
    pub fn new(
        mut params: AuthorizeUrlParams,
        config: SdkConfig,
        analytics_trace_id: impl Into<String>,
    ) -> Self {
        params.avoid_pay_alt_domain.get_or_insert(false);
        params.avoid_sdk_session.get_or_insert(false);
        params.disable_sign_up.get_or_insert(false);
        params.flow.get_or_insert_with(|| DEFAULT_FLOW.to_owned());
        params
            .flow_version
            .get_or_insert_with(|| DEFAULT_FLOW_VERSION.to_owned());
        params.prompt.get_or_insert_with(|| DEFAULT_PROMPT.to_owned());

        Self {
            params,
            config,
            analytics_trace_id: analytics_trace_id.into(),
            locale: None,
        }
    }

    /// Locale resolved by the host's translation layer. Caller parameters still win.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn params(&self) -> &AuthorizeUrlParams {
        &self.params
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn analytics_trace_id(&self) -> &str {
        &self.analytics_trace_id
    }

    pub fn authorize_url(&self) -> String {
        self.authorize_url_with(AuthorizeUrlParams::default())
    }

    /// Computes the URL with `overrides` applied last. A prompt ux role on a direct
    /// request with a client id yields the pre-auth URL instead.
    pub fn authorize_url_with(&self, overrides: AuthorizeUrlParams) -> String {
        let locale = self.params.locale.clone().or_else(|| self.locale.clone());

        if overrides.is_prompt() && !self.params.is_proxy() && self.params.client_id.is_some() {
            return build_pre_auth_url(
                &self.config.domains.pay_auth_domain,
                &PreAuthParams {
                    analytics_trace_id: Some(self.analytics_trace_id.clone()),
                    client_id: self.params.client_id.clone(),
                    flow: self.params.flow.clone(),
                    flow_version: self.params.flow_version.clone(),
                    locale,
                    storefront_domain: self.params.storefront_domain.clone(),
                },
                &self.config.page_origin,
            );
        }

        let ux_mode = self.params.ux_mode;
        let mut params = self.params.clone();
        params.analytics_context =
            adjust_analytics_context(self.params.analytics_context.as_deref(), ux_mode);
        params
            .analytics_trace_id
            .get_or_insert_with(|| self.analytics_trace_id.clone());
        params.locale = locale;
        if let Some(response_mode) =
            adjust_response_mode(self.params.response_mode.as_deref(), ux_mode)
        {
            params.response_mode = Some(response_mode);
        }

        build_authorize_url(
            &params.overlay(overrides),
            &self.config.domains,
            &self.config.page_origin,
        )
    }
}
