//! Session defaults: TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::native::LineConfig;
use crate::overlapped::DEFAULT_TIMEOUT_MS;
use crate::session::{DEFAULT_HID_INPUT_BUFFERS, SessionOptions};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# devport configuration. Missing keys take their defaults.\n\n";

/// Fewest input reports the HID class driver will buffer.
pub const MIN_HID_INPUT_BUFFERS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Read timeout in milliseconds. Negative = wait indefinitely.
    #[serde(default = "default_timeout")]
    pub read_timeout_ms: i64,

    /// Write timeout in milliseconds. Negative = wait indefinitely.
    #[serde(default = "default_timeout")]
    pub write_timeout_ms: i64,

    /// Input report ring size requested from the HID driver at open.
    #[serde(default = "default_hid_input_buffers")]
    pub hid_input_buffers: u32,

    /// Query HID report lengths at open instead of on first I/O.
    #[serde(default)]
    pub eager_report_lengths: bool,

    /// Initial serial line settings.
    /// Example in TOML: `[serial]` / `baud_rate = 115200` / `parity = "even"`
    #[serde(default)]
    pub serial: LineConfig,
}

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_MS
}

fn default_hid_input_buffers() -> u32 {
    DEFAULT_HID_INPUT_BUFFERS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            read_timeout_ms: default_timeout(),
            write_timeout_ms: default_timeout(),
            hid_input_buffers: default_hid_input_buffers(),
            eager_report_lengths: false,
            serial: LineConfig::default(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `hid_input_buffers` is below the driver minimum.
    HidInputBuffers(u32),
    /// A `[serial]` field is out of range.
    Serial(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::HidInputBuffers(n) => write!(
                f,
                "Invalid hid_input_buffers: {n} (minimum {MIN_HID_INPUT_BUFFERS})"
            ),
            ValidationError::Serial(e) => write!(f, "Invalid serial settings: {e}"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("Devport"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("devport"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended to the serialized settings.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.hid_input_buffers < MIN_HID_INPUT_BUFFERS {
            errors.push(ValidationError::HidInputBuffers(self.hid_input_buffers));
        }
        if let Err(e) = self.serial.validate() {
            errors.push(ValidationError::Serial(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert into session options, joining all problems into
    /// one `Config` error.
    pub fn session_options(&self) -> crate::error::Result<SessionOptions> {
        self.validate().map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            crate::DevportError::Config(joined.join("; "))
        })?;
        Ok(SessionOptions::from(self))
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        SessionOptions {
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
            hid_input_buffers: config.hid_input_buffers,
            eager_report_lengths: config.eager_report_lengths,
            line: config.serial,
        }
    }
}
