use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;

pub const DEFAULT_PROFILE: &str = "default";

/// A snapshot of the environment variables the AWS configuration reads.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Blank values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn home(&self) -> PathBuf {
        self.get("HOME")
            .or_else(|| self.get("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    fn aws_dir_file(&self, name: &str) -> PathBuf {
        let mut p = self.home();
        p.push(".aws");
        p.push(name);
        p
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.get("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.aws_dir_file("credentials"))
    }

    pub fn config_path(&self) -> PathBuf {
        self.get("AWS_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.aws_dir_file("config"))
    }

    pub fn sso_cache_dir(&self) -> PathBuf {
        let mut p = self.aws_dir_file("sso");
        p.push("cache");
        p
    }
}

pub type IniSections = HashMap<String, HashMap<String, String>>;

pub fn parse_ini(contents: &str) -> IniSections {
    let mut out = IniSections::new();
    let mut current: Option<String> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            out.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
            continue;
        };
        out.entry(section.clone())
            .or_default()
            .insert(key.trim().to_string(), value.trim().to_string());
    }
    out
}

/// Missing files read as empty; anything else is an error.
fn load_ini(path: &Path) -> anyhow::Result<IniSections> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(parse_ini(&s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(IniSections::new()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// One profile's settings, merged from both shared files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    values: HashMap<String, String>,
}

impl Profile {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// `~/.aws/config` and `~/.aws/credentials`, read once.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    config: IniSections,
    credentials: IniSections,
}

impl SharedConfig {
    pub fn load(env: &Env) -> anyhow::Result<Self> {
        Ok(Self {
            config: load_ini(&env.config_path())?,
            credentials: load_ini(&env.credentials_path())?,
        })
    }

    pub fn from_sections(config: IniSections, credentials: IniSections) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// The config file keeps non-default profiles under `[profile NAME]`; the credentials
    /// file uses the bare name, and its keys win.
    pub fn profile(&self, name: &str) -> Option<Profile> {
        let from_config = if name == DEFAULT_PROFILE {
            self.config.get(DEFAULT_PROFILE)
        } else {
            self.config.get(&format!("profile {name}"))
        };
        let from_credentials = self.credentials.get(name);
        if from_config.is_none() && from_credentials.is_none() {
            return None;
        }

        let mut values = HashMap::new();
        for section in [from_config, from_credentials].into_iter().flatten() {
            values.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(Profile { values })
    }

    pub fn sso_session(&self, name: &str) -> Option<Profile> {
        self.config
            .get(&format!("sso-session {name}"))
            .map(|values| Profile {
                values: values.clone(),
            })
    }

    pub fn region(&self, profile: &str) -> Option<String> {
        self.profile(profile)
            .and_then(|p| p.get("region").map(str::to_string))
    }
}
