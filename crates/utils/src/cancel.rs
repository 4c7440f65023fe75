//! Run cancellation
//!
//! The executor observes a [`CancellationToken`]; these helpers wire the
//! token to an operator interrupt or a deadline.

use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

/// Token cancelled on the first Ctrl-C
///
/// Must be called from within a tokio runtime.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                ::tracing::warn!("Interrupt received, cancelling run");
                child.cancel();
            }
            Err(e) => ::tracing::error!(error = %e, "Unable to listen for interrupt"),
        }
    });
    token
}

/// Cancel `token` once `timeout` elapses
///
/// Must be called from within a tokio runtime.
pub fn cancel_after(token: &CancellationToken, timeout: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                ::tracing::warn!(timeout_secs = timeout.as_secs(), "Run deadline reached, cancelling");
                token.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_deadline() {
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(5));
        assert!(!token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_interrupt_token_starts_uncancelled() {
        let token = interrupt_token();
        assert!(!token.is_cancelled());
    }
}
