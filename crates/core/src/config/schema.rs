//! Configuration schema definitions
//!
//! Every field has a default so an empty or absent file is valid.

use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigSchema {
    #[serde(default)]
    pub native: NativeConfig,

    #[serde(default)]
    pub custom: CustomConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub poll: PollConfig,
}

/// Native dependency pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeConfig {
    /// GCC version of the standalone toolchain
    #[serde(default = "default_compiler_version")]
    pub compiler_version: String,

    /// Android platform the toolchain targets
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Architectures built when no `--on` is given (short names)
    #[serde(default = "default_archs")]
    pub archs: Vec<String>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            compiler_version: default_compiler_version(),
            platform: default_platform(),
            archs: default_archs(),
        }
    }
}

fn default_compiler_version() -> String {
    "4.8".to_string()
}

fn default_platform() -> String {
    "android-14".to_string()
}

fn default_archs() -> Vec<String> {
    vec!["armeabi", "mips", "x86"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Custom app generation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomConfig {
    /// Package of the template application tree
    #[serde(default = "default_template_package")]
    pub template_package: String,

    /// Additional packages rewritten as `<new package>.<suffix>`
    #[serde(default = "default_package_aliases")]
    pub package_aliases: Vec<PackageAlias>,

    /// Permissions removed from the manifest (without `android.permission.`)
    #[serde(default = "default_useless_permissions")]
    pub useless_permissions: Vec<String>,
}

impl Default for CustomConfig {
    fn default() -> Self {
        Self {
            template_package: default_template_package(),
            package_aliases: default_package_aliases(),
            useless_permissions: default_useless_permissions(),
        }
    }
}

/// A template package rewritten relative to the new package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageAlias {
    pub from: String,
    pub suffix: String,
}

fn default_template_package() -> String {
    "org.kiwix.kiwixmobile".to_string()
}

fn default_package_aliases() -> Vec<PackageAlias> {
    vec![PackageAlias {
        from: "org.kiwix.zim.base".to_string(),
        suffix: "base".to_string(),
    }]
}

fn default_useless_permissions() -> Vec<String> {
    vec!["INTERNET".to_string()]
}

/// Release publishing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishConfig {
    /// Track used when `--store` names no channel
    #[serde(default = "default_track")]
    pub default_track: String,

    /// Timeout of each JSON API call; media uploads only time out while connecting
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            default_track: default_track(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_track() -> String {
    "alpha".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Fixed-interval polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    180
}
