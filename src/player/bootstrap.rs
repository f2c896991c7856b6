// Lazy, once-only initialization of the player host

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::OnceCell;

type LoadFuture<H> = Pin<Box<dyn Future<Output = anyhow::Result<Arc<H>>> + Send>>;
type Loader<H> = Box<dyn Fn() -> LoadFuture<H> + Send + Sync>;

/// Shared handle to the player host. The loader runs at most once; concurrent
/// callers of [`PlayerApi::ready`] await the same initialization. A failed
/// load is retried by the next caller.
pub struct PlayerApi<H: ?Sized> {
    loader: Loader<H>,
    host: OnceCell<Arc<H>>,
}

impl<H: ?Sized + Send + Sync + 'static> PlayerApi<H> {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<H>>> + Send + 'static,
    {
        PlayerApi {
            loader: Box::new(move || Box::pin(loader())),
            host: OnceCell::new(),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn ready(&self) -> anyhow::Result<Arc<H>> {
        let host = self
            .host
            .get_or_try_init(|| async {
                tracing::info!("initializing player host");
                (self.loader)().await
            })
            .await?;
        Ok(Arc::clone(host))
    }

    /// The host, if it has been initialized.
    pub fn get(&self) -> Option<Arc<H>> {
        self.host.get().cloned()
    }
}
