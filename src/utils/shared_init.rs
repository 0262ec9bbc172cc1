// src/utils/shared_init.rs
use std::future::Future;
use tokio::sync::OnceCell;

/// A lazily initialized value shared by every caller.
///
/// The first caller runs the initializer; callers arriving while it is in
/// flight wait on the same initialization instead of starting their own.
/// A failed initialization is not cached, so the next caller retries.
#[derive(Debug)]
pub struct SharedInit<T> {
    name: &'static str,
    cell: OnceCell<T>,
}

impl<T> SharedInit<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceCell::const_new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }

        self.cell
            .get_or_try_init(|| async {
                tracing::debug!("Initializing {}", self.name);
                let result = init().await;
                match &result {
                    Ok(_) => tracing::info!("{} loaded", self.name),
                    Err(e) => tracing::warn!("{} failed to load: {}", self.name, e),
                }
                result
            })
            .await
    }
}
