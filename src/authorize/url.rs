//! Authorization URL assembly.
//!
//! [`build_authorize_url`] serializes an [`AuthorizeUrlParams`] bag into one of four
//! destinations: the core customer-authentication login (with nested `shop_params`), the
//! core login-with-shop proxy, or one of the pay-auth-domain endpoints.

use std::fmt;
use std::str::FromStr;

use url::form_urlencoded;

use crate::config::AuthDomains;

pub const DEFAULT_RESPONSE_MODE: &str = "web_message";
pub const DEFAULT_RESPONSE_TYPE: &str = "id_token";
pub const DEFAULT_SCOPE: &str = "openid email profile";
pub const SELF_SERVE_ANALYTICS_CONTEXT: &str = "loginWithShopSelfServe";
pub const PROMPT_UX_ROLE: &str = "prompt";
pub const POP_UP_REDIRECT_TYPE: &str = "pop_up";

/// Keys kept at the top level of a customer-authentication login URL. Everything else
/// travels inside `shop_params`.
pub const CUSTOMER_AUTH_TOP_LEVEL_PARAMS: &[&str] =
    &["return_to", "locale", "login_hint", "login_hint_mode"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UxMode {
    Iframe,
    Redirect,
    Windoid,
}

impl UxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UxMode::Iframe => "iframe",
            UxMode::Redirect => "redirect",
            UxMode::Windoid => "windoid",
        }
    }
}

impl fmt::Display for UxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UxMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "iframe" => Ok(UxMode::Iframe),
            "redirect" => Ok(UxMode::Redirect),
            "windoid" => Ok(UxMode::Windoid),
            other => Err(format!("unknown ux mode `{other}`")),
        }
    }
}

/// Parameter bag for the authorization URL. `None` fields are never serialized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizeUrlParams {
    pub proxy: Option<bool>,
    pub proxy_core_idp: Option<bool>,
    pub avoid_pay_alt_domain: Option<bool>,

    pub accent_color: Option<String>,
    pub analytics_context: Option<String>,
    pub analytics_trace_id: Option<String>,
    pub api_key: Option<String>,
    pub avoid_sdk_session: Option<bool>,
    pub checkout_redirect_url: Option<String>,
    pub checkout_token: Option<String>,
    pub checkout_version: Option<String>,
    pub client_id: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub consent_challenge: Option<bool>,
    pub ctx: Option<String>,
    pub dark_mode: Option<bool>,
    pub disable_sign_up: Option<bool>,
    pub embed: Option<String>,
    pub error: Option<String>,
    pub experiments: Option<String>,
    pub flow: Option<String>,
    pub flow_version: Option<String>,
    pub hide_buttons: Option<bool>,
    pub hide_copy: Option<bool>,
    pub hide_header: Option<bool>,
    pub is_compact_layout: Option<bool>,
    pub is_full_view: Option<bool>,
    pub locale: Option<String>,
    pub login_hint: Option<String>,
    pub modal_customized: Option<bool>,
    pub order_id: Option<String>,
    pub origin: Option<String>,
    pub personalize_ads: Option<bool>,
    pub placement: Option<String>,
    pub pop_up_features: Option<String>,
    pub pop_up_name: Option<String>,
    pub prompt: Option<String>,
    pub redirect_type: Option<String>,
    pub redirect_uri: Option<String>,
    pub require_verification: Option<bool>,
    pub response_mode: Option<String>,
    pub response_type: Option<String>,
    pub return_uri: Option<String>,
    pub scope: Option<String>,
    pub shop_id: Option<String>,
    pub shopify_essential: Option<String>,
    pub state: Option<String>,
    pub storefront_domain: Option<String>,
    pub transaction_params: Option<String>,
    pub ux_mode: Option<UxMode>,
    pub ux_role: Option<String>,
}

macro_rules! overlay_fields {
    ($base:ident, $overrides:ident, $($field:ident),+ $(,)?) => {
        $(
            if $overrides.$field.is_some() {
                $base.$field = $overrides.$field;
            }
        )+
    };
}

impl AuthorizeUrlParams {
    pub fn is_proxy(&self) -> bool {
        self.proxy.unwrap_or(false)
    }

    pub fn is_proxy_core_idp(&self) -> bool {
        self.proxy_core_idp.unwrap_or(false)
    }

    pub fn is_prompt(&self) -> bool {
        self.ux_role.as_deref() == Some(PROMPT_UX_ROLE)
    }

    /// Returns `self` with every field that `overrides` sets replaced.
    pub fn overlay(mut self, overrides: AuthorizeUrlParams) -> Self {
        overlay_fields!(
            self,
            overrides,
            proxy,
            proxy_core_idp,
            avoid_pay_alt_domain,
            accent_color,
            analytics_context,
            analytics_trace_id,
            api_key,
            avoid_sdk_session,
            checkout_redirect_url,
            checkout_token,
            checkout_version,
            client_id,
            code_challenge,
            code_challenge_method,
            consent_challenge,
            ctx,
            dark_mode,
            disable_sign_up,
            embed,
            error,
            experiments,
            flow,
            flow_version,
            hide_buttons,
            hide_copy,
            hide_header,
            is_compact_layout,
            is_full_view,
            locale,
            login_hint,
            modal_customized,
            order_id,
            origin,
            personalize_ads,
            placement,
            pop_up_features,
            pop_up_name,
            prompt,
            redirect_type,
            redirect_uri,
            require_verification,
            response_mode,
            response_type,
            return_uri,
            scope,
            shop_id,
            shopify_essential,
            state,
            storefront_domain,
            transaction_params,
            ux_mode,
            ux_role,
        );
        self
    }

    fn uses_self_serve_ui(&self) -> bool {
        self.analytics_context.as_deref() == Some(SELF_SERVE_ANALYTICS_CONTEXT)
            && self.ux_mode != Some(UxMode::Iframe)
            && !self.is_prompt()
    }
}

/// Ordered query parameters: `(key, value)` pairs.
pub type QueryParams = Vec<(&'static str, String)>;

fn bool_param(value: Option<bool>) -> Option<String> {
    value.map(|value| if value { "true" } else { "false" }.to_owned())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|value| !value.is_empty())
}

fn or_default(value: &Option<String>, default: &str) -> String {
    non_empty(value).unwrap_or_else(|| default.to_owned())
}

/// Serializes `params` into ordered query pairs.
///
/// Booleans become `"true"`/`"false"` only when set. Empty strings are kept except for
/// the fields that fall back to a default or are only sent when non-empty
/// (`error`, `experiments`, `flow`, `login_hint`, `order_id`, `return_uri`, `shop_id`).
pub fn build_url_search_params(params: &AuthorizeUrlParams, page_origin: &str) -> QueryParams {
    let sign_up_enabled = params.disable_sign_up.map(|disabled| !disabled);
    let pop_up = params.redirect_type.as_deref() == Some(POP_UP_REDIRECT_TYPE);

    let entries: Vec<(&'static str, Option<String>)> = vec![
        ("analytics_context", params.analytics_context.clone()),
        ("analytics_trace_id", params.analytics_trace_id.clone()),
        ("avoid_sdk_session", bool_param(params.avoid_sdk_session)),
        ("api_key", params.api_key.clone()),
        ("checkout_redirect_url", params.checkout_redirect_url.clone()),
        ("checkout_token", params.checkout_token.clone()),
        ("checkout_version", params.checkout_version.clone()),
        ("client_id", params.client_id.clone()),
        ("code_challenge", params.code_challenge.clone()),
        ("code_challenge_method", params.code_challenge_method.clone()),
        (
            "compact_layout",
            bool_param(Some(params.is_compact_layout.unwrap_or(true))),
        ),
        ("consent_challenge", bool_param(params.consent_challenge)),
        ("ctx", params.ctx.clone()),
        ("customize-modal", bool_param(params.modal_customized)),
        ("embed", params.embed.clone()),
        ("error", non_empty(&params.error)),
        ("experiments", non_empty(&params.experiments)),
        ("flow", non_empty(&params.flow)),
        ("flow_version", params.flow_version.clone()),
        ("full_view", bool_param(params.is_full_view)),
        ("hide_copy", bool_param(params.hide_copy)),
        ("locale", params.locale.clone()),
        ("login_hint", non_empty(&params.login_hint)),
        ("order_id", non_empty(&params.order_id)),
        ("origin", params.origin.clone()),
        ("personalize_ads", bool_param(params.personalize_ads)),
        ("hide_buttons", bool_param(params.hide_buttons)),
        ("hide_header", bool_param(params.hide_header)),
        ("accent_color", params.accent_color.clone()),
        ("dark_mode", bool_param(params.dark_mode)),
        ("placement", params.placement.clone()),
        (
            "pop_up_features",
            params.pop_up_features.clone().filter(|_| pop_up),
        ),
        ("pop_up_name", params.pop_up_name.clone().filter(|_| pop_up)),
        ("preact", Some("true".to_owned())),
        ("prompt", params.prompt.clone()),
        ("redirect_type", params.redirect_type.clone()),
        ("redirect_uri", Some(or_default(&params.redirect_uri, page_origin))),
        ("require_verification", bool_param(params.require_verification)),
        (
            "response_mode",
            Some(or_default(&params.response_mode, DEFAULT_RESPONSE_MODE)),
        ),
        (
            "response_type",
            Some(or_default(&params.response_type, DEFAULT_RESPONSE_TYPE)),
        ),
        ("return_uri", non_empty(&params.return_uri)),
        ("scope", Some(or_default(&params.scope, DEFAULT_SCOPE))),
        ("sign_up_enabled", bool_param(sign_up_enabled)),
        ("shop_id", non_empty(&params.shop_id)),
        ("shopify_essential", params.shopify_essential.clone()),
        ("state", params.state.clone()),
        ("storefront_domain", params.storefront_domain.clone()),
        ("target_origin", Some(page_origin.to_owned())),
        ("transaction_params", params.transaction_params.clone()),
    ];

    let mut query: QueryParams = entries
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect();
    if let Some(ux_mode) = params.ux_mode {
        query.push(("ux_mode", ux_mode.as_str().to_owned()));
    }
    if let Some(ux_role) = &params.ux_role {
        query.push(("ux_role", ux_role.clone()));
    }
    query
}

/// Splits the full parameter set for the customer-authentication login endpoint: only
/// [`CUSTOMER_AUTH_TOP_LEVEL_PARAMS`] stay at the top level, the rest is form-encoded again
/// into a single `shop_params` value. Windoid logins also get `display=popup`.
pub fn build_customer_auth_login_params(
    params: &AuthorizeUrlParams,
    page_origin: &str,
) -> QueryParams {
    let mut top_level: QueryParams = Vec::new();
    if params.ux_mode == Some(UxMode::Windoid) {
        top_level.push(("display", "popup".to_owned()));
    }

    let mut shop_params = form_urlencoded::Serializer::new(String::new());
    let mut nested = 0usize;
    for (key, value) in build_url_search_params(params, page_origin) {
        if CUSTOMER_AUTH_TOP_LEVEL_PARAMS.contains(&key) {
            top_level.push((key, value));
        } else {
            shop_params.append_pair(key, &value);
            nested += 1;
        }
    }

    if nested > 0 {
        top_level.push(("shop_params", shop_params.finish()));
    }
    top_level
}

pub fn encode_query(query: &[(&str, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())))
        .finish()
}

/// Builds the authorization destination for `params`.
///
/// Returns an empty string when the request is neither proxied nor carries a client id;
/// such a request must not be sent.
pub fn build_authorize_url(
    params: &AuthorizeUrlParams,
    domains: &AuthDomains,
    page_origin: &str,
) -> String {
    if !params.is_proxy() && params.client_id.is_none() {
        return String::new();
    }

    if params.is_proxy() {
        if params.is_proxy_core_idp() {
            let query = build_customer_auth_login_params(params, page_origin);
            return format!(
                "{}/customer_authentication/login?{}",
                domains.core_auth_domain,
                encode_query(&query)
            );
        }

        let query = build_url_search_params(params, page_origin);
        return format!(
            "{}/services/login_with_shop/authorize?{}",
            domains.core_auth_domain,
            encode_query(&query)
        );
    }

    let query = encode_query(&build_url_search_params(params, page_origin));
    if params.uses_self_serve_ui() {
        return format!("{}/oauth/authorize?{query}", domains.pay_auth_domain);
    }

    let path = if params.avoid_pay_alt_domain.unwrap_or(false) {
        "/pay/sdk-authorize"
    } else {
        "/pay/sdk-session"
    };
    format!("{}{path}?{query}", domains.pay_auth_domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const PAGE: &str = "https://store.example.com";

    fn domains() -> AuthDomains {
        AuthDomains::new(
            "https://store.example.com",
            "https://shop.app",
            "https://pay.shopify.com",
        )
    }

    fn query_of(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    fn lookup<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    fn client(client_id: &str) -> AuthorizeUrlParams {
        AuthorizeUrlParams {
            client_id: Some(client_id.into()),
            ..Default::default()
        }
    }

    #[test]
    fn requires_proxy_or_client_id() {
        assert_eq!(
            build_authorize_url(&AuthorizeUrlParams::default(), &domains(), PAGE),
            ""
        );
    }

    #[test]
    fn applies_defaults_and_omits_unset_fields() {
        let url = build_authorize_url(&client("abc"), &domains(), PAGE);
        assert!(url.starts_with("https://shop.app/pay/sdk-session?"));

        let query = query_of(&url);
        assert_eq!(lookup(&query, "client_id"), Some("abc"));
        assert_eq!(lookup(&query, "compact_layout"), Some("true"));
        assert_eq!(lookup(&query, "preact"), Some("true"));
        assert_eq!(lookup(&query, "redirect_uri"), Some(PAGE));
        assert_eq!(lookup(&query, "response_mode"), Some("web_message"));
        assert_eq!(lookup(&query, "response_type"), Some("id_token"));
        assert_eq!(lookup(&query, "scope"), Some("openid email profile"));
        assert_eq!(lookup(&query, "target_origin"), Some(PAGE));
        assert_eq!(lookup(&query, "sign_up_enabled"), None);
        assert_eq!(lookup(&query, "avoid_sdk_session"), None);
        assert_eq!(lookup(&query, "flow"), None);
    }

    #[test]
    fn booleans_serialize_only_when_set() {
        let params = AuthorizeUrlParams {
            avoid_sdk_session: Some(false),
            disable_sign_up: Some(true),
            dark_mode: Some(true),
            ..client("abc")
        };
        let query = build_url_search_params(&params, PAGE);
        let value = |key: &str| {
            query
                .iter()
                .find(|(candidate, _)| *candidate == key)
                .map(|(_, value)| value.as_str())
        };

        assert_eq!(value("avoid_sdk_session"), Some("false"));
        assert_eq!(value("sign_up_enabled"), Some("false"));
        assert_eq!(value("dark_mode"), Some("true"));
        assert_eq!(value("hide_copy"), None);
    }

    #[test]
    fn empty_strings_are_kept_but_falsy_optionals_are_dropped() {
        let params = AuthorizeUrlParams {
            locale: Some(String::new()),
            login_hint: Some(String::new()),
            error: Some(String::new()),
            redirect_uri: Some(String::new()),
            ..client("abc")
        };
        let query = build_url_search_params(&params, PAGE);
        let keys: Vec<&str> = query.iter().map(|(key, _)| *key).collect();

        assert!(keys.contains(&"locale"));
        assert!(!keys.contains(&"login_hint"));
        assert!(!keys.contains(&"error"));
        assert!(query.contains(&("redirect_uri", PAGE.to_owned())));
    }

    #[test]
    fn pop_up_fields_need_pop_up_redirect_type() {
        let mut params = AuthorizeUrlParams {
            pop_up_features: Some("width=10".into()),
            pop_up_name: Some("login".into()),
            ..client("abc")
        };
        let keys = |params: &AuthorizeUrlParams| -> Vec<&'static str> {
            build_url_search_params(params, PAGE)
                .into_iter()
                .map(|(key, _)| key)
                .collect()
        };
        assert!(!keys(&params).contains(&"pop_up_name"));

        params.redirect_type = Some("pop_up".into());
        let keys = keys(&params);
        assert!(keys.contains(&"pop_up_name"));
        assert!(keys.contains(&"pop_up_features"));
    }

    #[test]
    fn keys_follow_documented_order() {
        let params = AuthorizeUrlParams {
            analytics_context: Some("loginWithShop".into()),
            flow: Some("default".into()),
            ux_mode: Some(UxMode::Iframe),
            ux_role: Some("modal".into()),
            ..client("abc")
        };
        let keys: Vec<&str> = build_url_search_params(&params, PAGE)
            .into_iter()
            .map(|(key, _)| key)
            .collect();

        assert_eq!(keys.first(), Some(&"analytics_context"));
        assert_eq!(&keys[keys.len() - 2..], &["ux_mode", "ux_role"]);
        let client = keys.iter().position(|key| *key == "client_id").unwrap();
        let flow = keys.iter().position(|key| *key == "flow").unwrap();
        assert!(client < flow);
    }

    #[test]
    fn self_serve_ui_uses_oauth_endpoint() {
        let params = AuthorizeUrlParams {
            analytics_context: Some(SELF_SERVE_ANALYTICS_CONTEXT.into()),
            ux_mode: Some(UxMode::Windoid),
            ..client("abc")
        };
        assert!(build_authorize_url(&params, &domains(), PAGE)
            .starts_with("https://shop.app/oauth/authorize?"));

        let prompt = AuthorizeUrlParams {
            ux_role: Some("prompt".into()),
            ..params.clone()
        };
        assert!(build_authorize_url(&prompt, &domains(), PAGE)
            .starts_with("https://shop.app/pay/sdk-session?"));

        let avoid_alt = AuthorizeUrlParams {
            avoid_pay_alt_domain: Some(true),
            ux_mode: Some(UxMode::Iframe),
            ..params
        };
        assert!(build_authorize_url(&avoid_alt, &domains(), PAGE)
            .starts_with("https://shop.app/pay/sdk-authorize?"));
    }

    #[test]
    fn proxy_uses_core_login_with_shop() {
        let params = AuthorizeUrlParams {
            proxy: Some(true),
            flow: Some("default".into()),
            ..Default::default()
        };
        let url = build_authorize_url(&params, &domains(), PAGE);
        assert!(url.starts_with("https://store.example.com/services/login_with_shop/authorize?"));
        assert_eq!(lookup(&query_of(&url), "flow"), Some("default"));
    }

    #[test]
    fn core_idp_nests_shop_params() {
        let params = AuthorizeUrlParams {
            proxy: Some(true),
            proxy_core_idp: Some(true),
            locale: Some("fr".into()),
            login_hint: Some("buyer@example.com".into()),
            flow: Some("default".into()),
            scope: Some("openid email".into()),
            ux_mode: Some(UxMode::Windoid),
            ..Default::default()
        };
        let url = build_authorize_url(&params, &domains(), PAGE);
        assert!(url.starts_with("https://store.example.com/customer_authentication/login?display=popup&"));

        let query = query_of(&url);
        let keys: Vec<&str> = query.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["display", "locale", "login_hint", "shop_params"]);

        let shop_params: Vec<(String, String)> =
            form_urlencoded::parse(lookup(&query, "shop_params").unwrap().as_bytes())
                .into_owned()
                .collect();
        assert!(shop_params.contains(&("flow".into(), "default".into())));
        assert!(shop_params.contains(&("scope".into(), "openid email".into())));
        assert!(shop_params.contains(&("ux_mode".into(), "windoid".into())));
        assert!(!shop_params.iter().any(|(key, _)| key == "locale"));
    }

    #[test]
    fn overlay_replaces_only_set_fields() {
        let base = AuthorizeUrlParams {
            flow: Some("default".into()),
            locale: Some("en".into()),
            ..client("abc")
        };
        let merged = base.overlay(AuthorizeUrlParams {
            locale: Some("de".into()),
            ux_role: Some("prompt".into()),
            ..Default::default()
        });

        assert_eq!(merged.client_id.as_deref(), Some("abc"));
        assert_eq!(merged.flow.as_deref(), Some("default"));
        assert_eq!(merged.locale.as_deref(), Some("de"));
        assert!(merged.is_prompt());
    }
}
