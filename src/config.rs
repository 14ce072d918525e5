use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};

use crate::error::{MurError, codes};

pub const RC_FILE_NAME: &str = ".murmurrc";
pub const RC_SECTION: &str = "murmur-nexus";
pub const DEFAULT_INDEX_URL: &str = "https://artifacts.murmur.nexus/simple";
pub const DEFAULT_EXTRA_INDEX_URL: &str = "https://pypi.org/simple";
pub const DEFAULT_SERVER_URL: &str = "https://api.murmur.nexus";

const INDEX_URL_KEY: &str = "index-url";
const EXTRA_INDEX_URL_KEY: &str = "extra-index-url";
const SERVER_URL_KEY: &str = "server-url";

/// A `.murmurrc` file: INI with a `[murmur-nexus]` section, readable and
/// writable by Python's `configparser`. Keys are case-insensitive and
/// multi-line values continue on indented lines.
#[derive(Debug, Clone)]
pub struct RcFile {
    ini: Ini,
}

impl Default for RcFile {
    fn default() -> Self {
        Self { ini: Ini::new() }
    }
}

impl RcFile {
    pub fn parse(raw: &str) -> Result<Self> {
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            enabled_indented_mutiline_value: true,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(raw, options).context("invalid .murmurrc syntax")?;
        Ok(Self { ini })
    }

    /// An absent file loads as empty.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// The file `mur config init` writes.
    pub fn with_defaults() -> Self {
        let mut rc = Self::default();
        rc.set(INDEX_URL_KEY, DEFAULT_INDEX_URL);
        rc.set(EXTRA_INDEX_URL_KEY, DEFAULT_EXTRA_INDEX_URL);
        rc
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.ini
            .section(Some(RC_SECTION))?
            .iter()
            .find(|(name, _)| normalize_key(name) == key)
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.remove(key);
        self.ini
            .with_section(Some(RC_SECTION))
            .set(normalize_key(key), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let stored = self
            .ini
            .section(Some(RC_SECTION))?
            .iter()
            .find(|(name, _)| normalize_key(name) == normalize_key(key))
            .map(|(name, _)| name.to_string())?;
        self.ini.section_mut(Some(RC_SECTION))?.remove(stored.as_str())
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.ini
            .section(Some(RC_SECTION))
            .map(|section| {
                section
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn index_url(&self) -> Option<&str> {
        self.get(INDEX_URL_KEY)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// `extra-index-url` split on newlines (and any other whitespace).
    pub fn extra_index_urls(&self) -> Vec<String> {
        self.get(EXTRA_INDEX_URL_KEY)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.get(SERVER_URL_KEY)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Writes the file, creating parent directories. Multi-line values get
    /// tab-indented continuation lines.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = Ini::new();
        for (section, properties) in self.ini.iter() {
            for (key, value) in properties.iter() {
                out.with_section(section).set(key, value.replace('\n', "\n\t"));
            }
        }
        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            kv_separator: " = ",
            ..WriteOption::default()
        };
        out.write_to_file_opt(path, options)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
}

impl Scope {
    pub fn label(self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Global => "global",
        }
    }
}

/// Locations of the two `.murmurrc` files.
#[derive(Debug, Clone)]
pub struct RcPaths {
    pub local: PathBuf,
    pub global: PathBuf,
}

impl RcPaths {
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("unable to determine current directory")?;
        let global = global_rc_path()
            .ok_or_else(|| anyhow!("failed to resolve ~/.murmurrc (no home directory found)"))?;
        Ok(Self {
            local: cwd.join(RC_FILE_NAME),
            global,
        })
    }

    pub fn new(local: impl Into<PathBuf>, global: impl Into<PathBuf>) -> Self {
        Self {
            local: local.into(),
            global: global.into(),
        }
    }

    /// The local file when present, otherwise the global one.
    pub fn effective(&self) -> (&Path, Scope) {
        if self.local.exists() {
            (&self.local, Scope::Local)
        } else {
            (&self.global, Scope::Global)
        }
    }

    /// Write target for `set`/`unset`: local only when it exists and the
    /// caller did not ask for global.
    pub fn write_target(&self, force_global: bool) -> (&Path, Scope) {
        if self.local.exists() && !force_global {
            (&self.local, Scope::Local)
        } else {
            (&self.global, Scope::Global)
        }
    }

    pub fn path(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Local => &self.local,
            Scope::Global => &self.global,
        }
    }
}

pub fn global_rc_path() -> Option<PathBuf> {
    if let Some(raw) = std::env::var_os("MURMURRC_PATH") {
        return Some(PathBuf::from(raw));
    }
    dirs::home_dir().map(|home| home.join(RC_FILE_NAME))
}

/// Writes the default global `.murmurrc` when neither file exists yet.
/// Returns whether a file was created.
pub fn ensure_rc_file(paths: &RcPaths) -> Result<bool> {
    if paths.local.exists() || paths.global.exists() {
        return Ok(false);
    }
    RcFile::with_defaults().save(&paths.global).map_err(|err| {
        MurError::new(codes::REGISTRY_CONFIG, "Failed to create default .murmurrc")
            .with_detail(format!("Could not write {}", paths.global.display()))
            .with_source(err)
    })?;
    tracing::info!(path = %paths.global.display(), "created default .murmurrc");
    Ok(true)
}

/// Registry settings resolved from the effective `.murmurrc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub index_url: String,
    pub extra_index_urls: Vec<String>,
    pub server_url: String,
}

impl RegistrySettings {
    pub fn load(paths: &RcPaths) -> Result<Self> {
        let (path, scope) = paths.effective();
        let rc = RcFile::load(path).map_err(|err| {
            MurError::new(codes::REGISTRY_CONFIG, "Failed to verify registry settings")
                .with_detail(format!(
                    "Error reading registry configuration from {}",
                    path.display()
                ))
                .with_source(err)
        })?;
        tracing::debug!(path = %path.display(), scope = scope.label(), "loaded .murmurrc");
        Self::from_rc(&rc)
    }

    /// Creates the default global `.murmurrc` first when no file exists.
    pub fn load_or_init(paths: &RcPaths) -> Result<Self> {
        ensure_rc_file(paths)?;
        Self::load(paths)
    }

    pub fn from_rc(rc: &RcFile) -> Result<Self> {
        let index_url = rc
            .index_url()
            .ok_or_else(|| {
                MurError::new(codes::REGISTRY_CONFIG, "Missing registry configuration").with_detail(
                    "No 'index-url' found in .murmurrc under [murmur-nexus] section.",
                )
            })?
            .to_string();
        Ok(Self {
            index_url,
            extra_index_urls: rc.extra_index_urls(),
            server_url: resolve_server_url(rc.server_url()),
        })
    }

    /// A registry other than the public index is treated as a private
    /// package index.
    pub fn is_private(&self) -> bool {
        self.index_url.trim_end_matches('/') != DEFAULT_INDEX_URL
    }

    pub fn package_indexes(&self) -> Vec<String> {
        let mut indexes = vec![self.index_url.clone()];
        indexes.extend(self.extra_index_urls.iter().cloned());
        indexes
    }
}

/// API server URL: `MURMUR_SERVER_URL`, then `server-url`, then the default.
pub fn resolve_server_url(configured: Option<&str>) -> String {
    std::env::var("MURMUR_SERVER_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Server URL for commands that do not need a complete registry section.
pub fn server_url(paths: &RcPaths) -> Result<String> {
    let (path, _) = paths.effective();
    let rc = RcFile::load(path)?;
    Ok(resolve_server_url(rc.server_url()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// What `mur config init` has always written.
    const INIT_OUTPUT: &str = "[murmur-nexus]\n\
        index-url = https://artifacts.murmur.nexus/simple\n\
        extra-index-url = https://pypi.org/simple\n\n";

    #[test]
    fn reads_plain_ini_values() {
        let rc = RcFile::parse(INIT_OUTPUT).unwrap();
        let settings = RegistrySettings::from_rc(&rc).unwrap();
        assert!(!settings.is_private());
        assert_eq!(
            settings.package_indexes(),
            vec![
                "https://artifacts.murmur.nexus/simple".to_string(),
                "https://pypi.org/simple".to_string()
            ]
        );
    }

    #[test]
    fn multi_line_extra_index_url_is_split() {
        let rc = RcFile::parse(
            "[murmur-nexus]\n\
             index-url = https://pypi.internal.example/simple\n\
             extra-index-url = https://pypi.org/simple\n\
             \thttps://mirror.example/simple\n",
        )
        .unwrap();
        let settings = RegistrySettings::from_rc(&rc).unwrap();
        assert!(settings.is_private());
        assert_eq!(
            settings.extra_index_urls,
            vec!["https://pypi.org/simple", "https://mirror.example/simple"]
        );
    }

    #[test]
    fn keys_are_case_insensitive() {
        let mut rc = RcFile::parse("[murmur-nexus]\nIndex-URL = https://a/simple\n").unwrap();
        assert_eq!(rc.index_url(), Some("https://a/simple"));
        rc.set("INDEX-URL", "https://b/simple");
        assert_eq!(rc.entries(), vec![("index-url".to_string(), "https://b/simple".to_string())]);
        assert_eq!(rc.remove("index-url").as_deref(), Some("https://b/simple"));
        assert!(rc.entries().is_empty());
    }

    #[test]
    fn saved_file_is_plain_ini_and_reloads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/.murmurrc");
        let mut rc = RcFile::with_defaults();
        rc.set("extra-index-url", "https://pypi.org/simple\nhttps://mirror.example/simple");
        rc.save(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("[murmur-nexus]"));
        assert!(written.contains("index-url = https://artifacts.murmur.nexus/simple"));
        assert!(written.contains("\thttps://mirror.example/simple"));
        assert!(!written.contains('"'));

        let reloaded = RcFile::load(&path).unwrap();
        assert_eq!(
            reloaded.extra_index_urls(),
            vec!["https://pypi.org/simple", "https://mirror.example/simple"]
        );
    }

    #[test]
    fn missing_index_url_is_registry_config_error() {
        let rc = RcFile::parse("[murmur-nexus]\nfoo = bar\n").unwrap();
        let err = RegistrySettings::from_rc(&rc).unwrap_err();
        let mur = crate::error::find_mur_error(&err).unwrap();
        assert_eq!(mur.code, codes::REGISTRY_CONFIG);
        assert_eq!(rc.get("foo"), Some("bar"));
    }

    #[test]
    fn local_file_wins_when_present() {
        let temp = TempDir::new().unwrap();
        let paths = RcPaths::new(temp.path().join("local"), temp.path().join("global"));
        assert_eq!(paths.effective().1, Scope::Global);
        fs::write(&paths.local, "[murmur-nexus]\n").unwrap();
        assert_eq!(paths.effective().1, Scope::Local);
        assert_eq!(paths.write_target(true).1, Scope::Global);
        assert_eq!(paths.write_target(false).1, Scope::Local);
    }

    #[test]
    fn absent_file_loads_as_empty() {
        let temp = TempDir::new().unwrap();
        let rc = RcFile::load(&temp.path().join("missing")).unwrap();
        assert!(rc.index_url().is_none());
    }

    #[test]
    fn first_use_creates_default_global_file() {
        let temp = TempDir::new().unwrap();
        let paths = RcPaths::new(temp.path().join("work/.murmurrc"), temp.path().join("home/.murmurrc"));

        let settings = RegistrySettings::load_or_init(&paths).unwrap();
        assert_eq!(settings.index_url, DEFAULT_INDEX_URL);
        assert_eq!(settings.extra_index_urls, vec![DEFAULT_EXTRA_INDEX_URL]);
        assert!(paths.global.exists());
        assert!(!paths.local.exists());
    }

    #[test]
    fn existing_file_is_not_replaced() {
        let temp = TempDir::new().unwrap();
        let paths = RcPaths::new(temp.path().join("local"), temp.path().join("global"));
        fs::write(&paths.local, "[murmur-nexus]\nindex-url = https://corp/simple\n").unwrap();

        assert!(!ensure_rc_file(&paths).unwrap());
        assert!(!paths.global.exists());
        let settings = RegistrySettings::load_or_init(&paths).unwrap();
        assert_eq!(settings.index_url, "https://corp/simple");
    }
}
