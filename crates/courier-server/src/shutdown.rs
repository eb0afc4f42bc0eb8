use tokio::sync::watch;

/// Resolves once the shutdown flag is set or its sender is gone.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
