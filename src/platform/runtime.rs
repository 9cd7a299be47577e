//! Timer and task helpers shared by native and wasm builds.
//!
//! Native builds run on tokio; wasm builds use `gloo-timers` and `spawn_local`.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::future::{select, Either};

/// Spawns `future` in the background and forgets it.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Spawns `future` in the background and forgets it.
///
/// Uses the ambient tokio runtime when one is running, otherwise a lazily created
/// single-threaded runtime owned by a background thread.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle};

    static BACKGROUND: LazyLock<Option<Handle>> = LazyLock::new(|| {
        let runtime = Builder::new_current_thread().enable_all().build().ok()?;
        let handle = runtime.handle().clone();
        std::thread::Builder::new()
            .name("shop-login-background".into())
            .spawn(move || runtime.block_on(futures::future::pending::<()>()))
            .ok()?;
        Some(handle)
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else if let Some(handle) = BACKGROUND.as_ref() {
        handle.spawn(future);
    }
}

/// Asynchronously waits for `duration`. Zero durations return immediately.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Resolves to `Some(output)` when `future` completes within `duration`, `None` otherwise.
pub async fn with_timeout<F>(future: F, duration: Duration) -> Option<F::Output>
where
    F: Future,
{
    let future = pin!(future);
    let timer = pin!(sleep(duration));
    match select(future, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_none_when_elapsed() {
        let result = with_timeout(futures::future::pending::<u8>(), Duration::from_secs(10)).await;
        assert_eq!(result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_passes_through_ready_values() {
        let result = with_timeout(async { 7 }, Duration::from_secs(10)).await;
        assert_eq!(result, Some(7));
    }
}
