//! Process signals that stop the batch worker.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl-C (SIGINT) or, on Unix, SIGTERM.
///
/// Handlers are installed before this returns, so a signal delivered right
/// after the call is not lost and does not kill the process.
pub fn cancel_on_shutdown(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let term = async {
            terminate.recv().await;
        };
        #[cfg(not(unix))]
        let term = std::future::pending::<()>();

        tokio::select! {
            _ = interrupt => tracing::info!("interrupt received, finishing current record"),
            _ = term => tracing::info!("SIGTERM received, finishing current record"),
        }
        token.cancel();
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_cancels_token() {
        let token = CancellationToken::new();
        let handle = cancel_on_shutdown(token.clone()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("SIGTERM did not cancel the worker token");
        handle.await.unwrap();
    }
}
