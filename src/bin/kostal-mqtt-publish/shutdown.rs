use std::future::Future;

use log::warn;

/// Resolves on Ctrl+C, or on SIGTERM where there is one.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}. Only Ctrl+C stops the publisher");
                None
            }
        };

        tokio::select! {
            _ = interrupted(tokio::signal::ctrl_c()) => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => {
                        sig.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    interrupted(tokio::signal::ctrl_c()).await
}

/// Resolves once `listener` reports Ctrl+C. A listener that cannot be installed never resolves.
async fn interrupted<F>(listener: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = listener.await {
        warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await
    }
}
