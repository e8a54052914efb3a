use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PACKAGE_INDEX: &str = "https://cdn.jsdelivr.net/npm";

/// Resolves a package name to CommonJS-style JavaScript source.
pub trait PackageSource {
    fn fetch(&self, name: &str) -> Result<String>;
}

impl<P: PackageSource + ?Sized> PackageSource for Box<P> {
    fn fetch(&self, name: &str) -> Result<String> {
        (**self).fetch(name)
    }
}

pub fn validate_package_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("package name must not be empty"));
    }
    if trimmed != name {
        return Err(anyhow!("invalid package name '{name}': surrounding whitespace"));
    }
    if name.starts_with('.') || name.contains("..") || name.starts_with('/') {
        return Err(anyhow!("invalid package name '{name}'"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/');
    if !name.chars().all(allowed) {
        return Err(anyhow!("invalid package name '{name}'"));
    }
    Ok(())
}

/// Reads `<root>/<name>.js`.
#[derive(Debug, Clone)]
pub struct DirPackageSource {
    root: PathBuf,
}

impl DirPackageSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl PackageSource for DirPackageSource {
    fn fetch(&self, name: &str) -> Result<String> {
        validate_package_name(name)?;
        let path = self.root.join(format!("{name}.js"));
        fs::read_to_string(&path)
            .with_context(|| format!("package {name} not found at {}", path.display()))
    }
}

/// Fetches `<index>/<name>` over HTTP and keeps a disk copy keyed by URL.
#[derive(Debug, Clone)]
pub struct HttpPackageSource {
    index_url: String,
    cache_root: Option<PathBuf>,
    timeout: Duration,
}

impl HttpPackageSource {
    pub fn default_cache_root() -> Result<PathBuf> {
        let base = dirs::cache_dir().context("failed to resolve cache directory")?;
        Ok(base.join("parado").join("packages"))
    }

    pub fn new(index_url: String) -> Self {
        Self {
            index_url,
            cache_root: Self::default_cache_root().ok(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_root = None;
        self
    }

    pub fn with_cache_root(mut self, root: PathBuf) -> Self {
        self.cache_root = Some(root);
        self
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.index_url.trim_end_matches('/'), name)
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        let root = self.cache_root.as_ref()?;
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        Some(root.join(format!("{:x}.js", hasher.finalize())))
    }

    fn download(&self, url: &str) -> Result<String> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let response = client
            .get(url)
            .send()
            .with_context(|| format!("failed fetching {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "package index returned {} for {url}",
                response.status()
            ));
        }
        response
            .text()
            .with_context(|| format!("failed reading package body from {url}"))
    }
}

impl PackageSource for HttpPackageSource {
    fn fetch(&self, name: &str) -> Result<String> {
        validate_package_name(name)?;
        let url = self.url_for(name);
        let cached = self.cache_path(&url);

        if let Some(path) = cached.as_ref() {
            if let Ok(source) = fs::read_to_string(path) {
                tracing::debug!(package = name, path = %path.display(), "package cache hit");
                return Ok(source);
            }
        }

        let source = self.download(&url)?;
        if let Some(path) = cached {
            let write = path
                .parent()
                .map(fs::create_dir_all)
                .transpose()
                .and_then(|_| fs::write(&path, &source));
            if let Err(err) = write {
                tracing::warn!(path = %path.display(), error = %err, "failed caching package");
            }
        }
        Ok(source)
    }
}
