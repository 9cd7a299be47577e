//! Storefront analytics identity ("trekkie") attributes.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::platform::runtime::with_timeout;

pub type TrekkieAttributes = Map<String, Value>;

/// Attributes the tracker copies from the storefront's analytics library.
pub const DEFAULT_TREKKIE_ATTRIBUTES: &[&str] = &[
    "customerId",
    "isPersistentCookie",
    "path",
    "uniqToken",
    "visitToken",
];

/// Storefront analytics library as seen from the SDK.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait TrekkieSource: Send + Sync {
    /// `false` when the page has no storefront analytics at all.
    fn is_available(&self) -> bool;

    /// Resolves once the library is ready with its default attributes.
    async fn default_attributes(&self) -> TrekkieAttributes;
}

/// Picks `names` out of the storefront's default attributes.
///
/// Without a source, or when the library is missing, resolves to an empty map. A library
/// that never becomes ready is given up on after `timeout`.
pub async fn trekkie_attributes(
    source: Option<&dyn TrekkieSource>,
    names: &[&str],
    timeout: Duration,
) -> TrekkieAttributes {
    let Some(source) = source.filter(|source| source.is_available()) else {
        return TrekkieAttributes::new();
    };

    let defaults = with_timeout(source.default_attributes(), timeout)
        .await
        .unwrap_or_default();

    names
        .iter()
        .filter_map(|name| {
            defaults
                .get(*name)
                .filter(|value| !value.is_null())
                .map(|value| ((*name).to_owned(), value.clone()))
        })
        .collect()
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use serde_json::json;

    struct ReadySource(TrekkieAttributes);

    #[async_trait]
    impl TrekkieSource for ReadySource {
        fn is_available(&self) -> bool {
            true
        }

        async fn default_attributes(&self) -> TrekkieAttributes {
            self.0.clone()
        }
    }

    struct NeverReady;

    #[async_trait]
    impl TrekkieSource for NeverReady {
        fn is_available(&self) -> bool {
            true
        }

        async fn default_attributes(&self) -> TrekkieAttributes {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn selects_requested_attributes() {
        let source = ReadySource(
            json!({"uniqToken": "u1", "visitToken": "v1", "shopId": 9})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let attributes =
            trekkie_attributes(Some(&source), DEFAULT_TREKKIE_ATTRIBUTES, Duration::from_secs(10)).await;
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["uniqToken"], "u1");
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_empty_after_timeout() {
        let attributes =
            trekkie_attributes(Some(&NeverReady), DEFAULT_TREKKIE_ATTRIBUTES, Duration::from_secs(10)).await;
        assert!(attributes.is_empty());
    }

    #[tokio::test]
    async fn missing_source_is_empty() {
        let attributes = trekkie_attributes(None, DEFAULT_TREKKIE_ATTRIBUTES, Duration::from_secs(10)).await;
        assert!(attributes.is_empty());
    }
}
