pub mod abort;
pub mod casing;
pub mod debounce;
pub mod errors;
pub mod ids;
pub mod retry;
pub mod subscribe;
pub mod validators;

pub use abort::{AbortController, AbortSignal};
pub use casing::{to_camel_case, to_dashed_case, to_snake_case};
pub use debounce::Debouncer;
pub use errors::{ErrorName, ShopJsError};
pub use ids::generate_uuid_v4;
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
pub use subscribe::{Subscription, Unsubscribe};
pub use validators::{
    is_allowed_origin, is_root_domain_match, is_valid_email, is_valid_redirect_uri,
    validate_storefront_origin, OriginError,
};
