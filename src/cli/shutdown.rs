use tokio::select;
use tokio_util::sync::CancellationToken;

/// Cancels `cancellation` once the user presses Ctrl-C.
pub async fn detect_shutdown(cancellation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancellation.cancel();
        },
        _ = cancellation.cancelled() => {},
    };
}
