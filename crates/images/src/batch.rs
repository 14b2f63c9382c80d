use crate::cache::{ImageCache, ImageRef, LocalRef};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// What a batch run does to each reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// [`ensure`](ImageCache::ensure) every source URL.
    Populate,
    /// [`repair`](ImageCache::repair) every known local reference, pausing
    /// periodically to go easy on the image host.
    Validate,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Group size; every group runs fully in parallel before the next starts.
    pub concurrency: usize,
    /// In [`Mode::Validate`], pause after this many completed items.
    pub pause_every: usize,
    /// Length of that pause. Zero disables it.
    pub pause: Duration,
}
impl Default for BatchOptions {
    fn default() -> Self {
        Self { concurrency: 5, pause_every: 5, pause: Duration::from_secs(1) }
    }
}

/// Bounded-parallel driver for [`ImageCache`] over many references.
pub struct BatchFetcher {
    cache: Arc<ImageCache>,
    options: BatchOptions,
}

impl BatchFetcher {
    pub fn new(cache: Arc<ImageCache>, options: BatchOptions) -> Self {
        Self { cache, options }
    }

    /// Process every distinct, non-empty source in `refs` and map it to the
    /// reference callers should now use.
    ///
    /// A failing item never aborts the batch; it maps to its degraded
    /// reference (the source URL).
    pub async fn run(&self, refs: &[ImageRef], mode: Mode) -> HashMap<String, LocalRef> {
        let mut seen = HashSet::new();
        let pending: Vec<&ImageRef> =
            refs.iter().filter(|image| !image.is_empty() && seen.insert(image.source.as_str())).collect();

        let concurrency = self.options.concurrency.max(1);
        let mut resolved = HashMap::with_capacity(pending.len());
        let mut since_pause = 0;
        let mut degraded = 0;
        tracing::info!(items = pending.len(), ?mode, concurrency, "Starting image batch");

        for (index, group) in pending.chunks(concurrency).enumerate() {
            let results = join_all(group.iter().map(|image| self.process(image, mode))).await;
            for (image, result) in group.iter().zip(results) {
                let local = match result {
                    Some(local) => local,
                    None => {
                        degraded += 1;
                        LocalRef::degraded(&image.source)
                    },
                };
                resolved.insert(image.source.clone(), local);
            }

            since_pause += group.len();
            let more = (index + 1) * concurrency < pending.len();
            if mode == Mode::Validate && more && self.pausing() && since_pause >= self.options.pause_every {
                tokio::time::sleep(self.options.pause).await;
                since_pause = 0;
            }
        }

        tracing::info!(items = resolved.len(), degraded, ?mode, "Image batch complete");
        resolved
    }

    fn pausing(&self) -> bool {
        self.options.pause_every > 0 && !self.options.pause.is_zero()
    }

    async fn process(&self, image: &ImageRef, mode: Mode) -> Option<LocalRef> {
        let result = match mode {
            Mode::Populate => self.cache.ensure(&image.source).await,
            Mode::Validate => self.cache.repair(&image.local, Some(&image.source)).await,
        };
        match result {
            Ok(local) => Some(local),
            Err(e) => {
                tracing::warn!(source = %image.source, error = %e, "Image unavailable, falling back to remote URL");
                None
            },
        }
    }
}
