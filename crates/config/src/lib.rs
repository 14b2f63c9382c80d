//! Layered configuration for shelf.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `shelf.toml` in the platform configuration directory,
//! 3. an explicit file (`.toml`, `.yaml`/`.yml` or `.json`),
//! 4. `SHELF_` environment variables, nested keys separated by `__`
//!    (`SHELF_UPSTREAM__PAGE_SIZE=20`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use shelf_images::{BatchOptions, DEFAULT_PREFIX, HttpImageOptions};
use shelf_upstream::{DEFAULT_PAGE_SIZE, DEFAULT_TV_MARKER, HttpOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APPLICATION: &str = "shelf";
const FILE_NAME: &str = "shelf.toml";
const ENV_PREFIX: &str = "SHELF_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the snapshot and page archive store.
    pub data_dir: PathBuf,
    /// Root of the cover image cache.
    pub cache_dir: PathBuf,
    pub upstream: UpstreamConfig,
    pub images: ImagesConfig,
    pub classify: ClassifyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub referer: String,
    pub user_agent: String,
    pub page_size: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Public prefix of local image references, e.g. `/cache/images/`.
    pub prefix: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub referer: String,
    /// Downloads per parallel group.
    pub concurrency: usize,
    /// Validation pauses after this many items...
    pub pause_every: usize,
    /// ...for this long. Zero disables the pause.
    pub pause_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Movie records whose subtitle or genres carry one of these are TV shows.
    pub tv_markers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let dirs = ProjectDirs::from("", "", APPLICATION);
        Self {
            data_dir: dirs.as_ref().map(|d| d.data_dir().to_path_buf()).unwrap_or_default(),
            cache_dir: dirs.as_ref().map(|d| d.cache_dir().to_path_buf()).unwrap_or_default(),
            upstream: UpstreamConfig::default(),
            images: ImagesConfig::default(),
            classify: ClassifyConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let http = HttpOptions::default();
        Self {
            base_url: http.base_url,
            referer: http.referer,
            user_agent: http.user_agent,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: http.timeout.as_secs(),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        let http = HttpImageOptions::default();
        let batch = BatchOptions::default();
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            timeout_secs: http.timeout.as_secs(),
            user_agent: http.user_agent,
            referer: http.referer,
            concurrency: batch.concurrency,
            pause_every: batch.pause_every,
            pause_ms: u64::try_from(batch.pause.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self { tv_markers: vec![DEFAULT_TV_MARKER.to_string()] }
    }
}

impl Config {
    /// `shelf.toml` in the platform configuration directory, if there is one.
    pub fn user_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join(FILE_NAME))
    }

    /// Load from every layer, including the user's configuration file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(Self::user_file().as_deref(), explicit)
    }

    /// Load with a specific (optional) user file in place of the platform one.
    pub fn load_from(user_file: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(user_file, explicit)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()
    }

    fn figment(user_file: Option<&Path>, explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = user_file
            && path.is_file()
        {
            tracing::debug!(path = %path.display(), "Merging user configuration");
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::MissingFile(path.display().to_string()));
            }
            tracing::debug!(path = %path.display(), "Merging configuration file");
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
            figment = match extension.as_str() {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "json" => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn validate(self) -> Result<Self> {
        for (name, dir) in [("data_dir", &self.data_dir), ("cache_dir", &self.cache_dir)] {
            if !dir.is_absolute() {
                exn::bail!(ErrorKind::Invalid(format!("{name} must be an absolute path, got {:?}", dir)));
            }
        }
        if self.upstream.page_size == 0 {
            exn::bail!(ErrorKind::Invalid("upstream.page_size must be at least 1".to_string()));
        }
        if self.images.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("images.concurrency must be at least 1".to_string()));
        }
        if self.images.prefix.is_empty() {
            exn::bail!(ErrorKind::Invalid("images.prefix must not be empty".to_string()));
        }
        Ok(self)
    }

    pub fn upstream_options(&self) -> HttpOptions {
        HttpOptions {
            base_url: self.upstream.base_url.clone(),
            referer: self.upstream.referer.clone(),
            user_agent: self.upstream.user_agent.clone(),
            timeout: Duration::from_secs(self.upstream.timeout_secs),
        }
    }

    pub fn image_options(&self) -> HttpImageOptions {
        HttpImageOptions {
            user_agent: self.images.user_agent.clone(),
            referer: self.images.referer.clone(),
            timeout: Duration::from_secs(self.images.timeout_secs),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.images.concurrency,
            pause_every: self.images.pause_every,
            pause: Duration::from_millis(self.images.pause_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    const DIRS: &str = "data_dir = \"/srv/shelf/data\"\ncache_dir = \"/srv/shelf/cache\"\n";

    #[test]
    fn test_defaults_match_components() {
        let config = Config::default();
        assert_eq!(config.upstream.page_size, 50);
        assert_eq!(config.images.prefix, "/cache/images/");
        assert_eq!(config.batch_options().pause, Duration::from_secs(1));
        assert_eq!(config.image_options().timeout, Duration::from_secs(15));
        assert_eq!(config.upstream_options().base_url, HttpOptions::default().base_url);
        assert_eq!(config.classify.tv_markers, [DEFAULT_TV_MARKER]);
    }

    #[test]
    fn test_explicit_toml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file("shelf.toml", &format!("{DIRS}[upstream]\npage_size = 20\n[images]\nconcurrency = 3\n"))?;
            jail.set_env("SHELF_IMAGES__CONCURRENCY", "8");

            let config = Config::load_from(None, Some(Path::new("shelf.toml"))).unwrap();
            assert_eq!(config.data_dir, PathBuf::from("/srv/shelf/data"));
            assert_eq!(config.upstream.page_size, 20);
            assert_eq!(config.images.concurrency, 8);
            assert_eq!(config.images.pause_every, 5);
            Ok(())
        });
    }

    #[rstest]
    #[case("shelf.yaml", "data_dir: /a\ncache_dir: /b\nupstream:\n  page_size: 7\n")]
    #[case("shelf.yml", "data_dir: /a\ncache_dir: /b\nupstream:\n  page_size: 7\n")]
    #[case("shelf.json", r#"{"data_dir": "/a", "cache_dir": "/b", "upstream": {"page_size": 7}}"#)]
    fn test_format_by_extension(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = Config::load_from(None, Some(Path::new(name))).unwrap();
            assert_eq!(config.upstream.page_size, 7);
            assert_eq!(config.cache_dir, PathBuf::from("/b"));
            Ok(())
        });
    }

    #[test]
    fn test_user_file_is_overridden_by_explicit() {
        Jail::expect_with(|jail| {
            jail.create_file("user.toml", &format!("{DIRS}[images]\nprefix = \"/covers/\"\npause_ms = 0\n"))?;
            jail.create_file("explicit.toml", "[images]\npause_ms = 250\n")?;
            let config = Config::load_from(Some(Path::new("user.toml")), Some(Path::new("explicit.toml"))).unwrap();
            assert_eq!(config.images.prefix, "/covers/");
            assert_eq!(config.batch_options().pause, Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        Jail::expect_with(|jail| {
            let err = Config::load_from(None, Some(Path::new("absent.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::MissingFile(_)));

            jail.create_file("shelf.ini", "page_size = 1")?;
            let err = Config::load_from(None, Some(Path::new("shelf.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("data_dir = \"relative\"\ncache_dir = \"/b\"\n")]
    #[case("[upstream]\npage_size = 0\n")]
    #[case("[images]\nconcurrency = 0\n")]
    #[case("[images]\nprefix = \"\"\n")]
    fn test_rejects_invalid(#[case] contents: &str) {
        Jail::expect_with(|jail| {
            // Absolute dirs first so each case fails on its own key only.
            jail.create_file("base.toml", DIRS)?;
            jail.create_file("shelf.toml", contents)?;
            let err = Config::load_from(Some(Path::new("base.toml")), Some(Path::new("shelf.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file() {
        Jail::expect_with(|jail| {
            jail.create_file("shelf.toml", "[upstream]\npage_size = \"many\"\n")?;
            let err = Config::load_from(None, Some(Path::new("shelf.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }
}
