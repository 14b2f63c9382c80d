//! In-memory image source for testing.

use crate::ImageSource;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    bodies: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// In-memory [`ImageSource`] for testing.
///
/// Unknown URLs get a small deterministic body derived from the URL itself,
/// so tests only need to configure the exceptions: explicit bodies (including
/// empty ones) and URLs that fail outright.
#[derive(Default)]
pub struct MockImageSource {
    state: Mutex<State>,
}

impl MockImageSource {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve exactly `body` for `url`.
    pub fn set_body(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.state().bodies.insert(url.to_string(), body.into());
    }

    /// Fail every fetch of `url` with a 503.
    pub fn fail(&self, url: &str) {
        self.state().failing.insert(url.to_string());
    }

    pub fn recover(&self, url: &str) {
        self.state().failing.remove(url);
    }

    /// Total number of fetches attempted.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Number of fetches attempted for one URL.
    pub fn calls_for(&self, url: &str) -> usize {
        self.state().calls.iter().filter(|called| *called == url).count()
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.calls.push(url.to_string());
        if state.failing.contains(url.as_str()) {
            exn::bail!(ErrorKind::HttpStatus(503));
        }
        Ok(match state.bodies.get(url.as_str()) {
            Some(body) => body.clone(),
            None => format!("image:{url}").into_bytes(),
        })
    }
}
