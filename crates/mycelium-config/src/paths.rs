use std::path::PathBuf;

/// Locations of the bot's config and data on disk.
///
/// On macOS and Linux these follow the XDG base directory layout:
/// - Config: $XDG_CONFIG_HOME/{name} (default: ~/.config/{name})
/// - Data: $XDG_DATA_HOME/{name} (default: ~/.local/share/{name})
///
/// On Windows both live under %APPDATA%\{name}.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ProjectPaths {
    /// Resolve paths for the given application name.
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn new(name: &str) -> Option<Self> {
        let home = home_dir()?;
        Some(Self {
            config_dir: config_root(&home).join(name),
            data_dir: data_root(&home).join(name),
        })
    }

    /// Paths rooted at an explicit directory, used for portable installs and tests
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.clone(),
            data_dir: root,
        }
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.data_dir.join("scripts")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bot.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

#[cfg(not(target_os = "windows"))]
fn config_root(home: &std::path::Path) -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".config"))
}

#[cfg(not(target_os = "windows"))]
fn data_root(home: &std::path::Path) -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".local").join("share"))
}

#[cfg(target_os = "windows")]
fn config_root(home: &std::path::Path) -> PathBuf {
    std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.to_path_buf())
}

#[cfg(target_os = "windows")]
fn data_root(home: &std::path::Path) -> PathBuf {
    config_root(home)
}
