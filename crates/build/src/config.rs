//! Build configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How projects are detected, built, and where their output is found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Manifest file name looked up in the working directory.
    pub manifest: String,

    /// Script name in the manifest's `scripts` table that marks a build step.
    pub build_script: String,

    /// Dependency install command run before the build script.
    /// Empty means no install step.
    pub install_command: String,

    /// Command prefix used to invoke a manifest script.
    pub script_runner: String,

    /// Output directory candidates, highest priority first.
    pub output_dirs: Vec<String>,

    /// Dependency-cache directory names excluded from the artifact walk
    /// at any depth.
    pub cache_dirs: Vec<String>,

    /// Full command line that replaces `install_command` and
    /// `script_runner` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Shell override for running the build command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Extra environment variables for the build process.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            manifest: "package.json".into(),
            build_script: "build".into(),
            install_command: "npm install".into(),
            script_runner: "npm run".into(),
            output_dirs: ["dist", "build", "public", "out"]
                .into_iter()
                .map(String::from)
                .collect(),
            cache_dirs: vec!["node_modules".into()],
            command: None,
            shell: None,
            env: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    /// The full command line for a compiled project.
    pub fn build_command(&self) -> String {
        if let Some(command) = self.command.as_deref().filter(|c| !c.trim().is_empty()) {
            return command.to_string();
        }

        let run = format!("{} {}", self.script_runner, self.build_script);
        if self.install_command.trim().is_empty() {
            run
        } else {
            format!("{} && {run}", self.install_command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_installs_then_builds() {
        assert_eq!(
            BuildConfig::default().build_command(),
            "npm install && npm run build"
        );
    }

    #[test]
    fn empty_install_is_skipped() {
        let config = BuildConfig {
            install_command: String::new(),
            ..BuildConfig::default()
        };
        assert_eq!(config.build_command(), "npm run build");
    }

    #[test]
    fn command_override_wins() {
        let config = BuildConfig {
            command: Some("make site".into()),
            ..BuildConfig::default()
        };
        assert_eq!(config.build_command(), "make site");
    }

    #[test]
    fn default_output_priority() {
        assert_eq!(
            BuildConfig::default().output_dirs,
            vec!["dist", "build", "public", "out"]
        );
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: BuildConfig =
            serde_json::from_str(r#"{"install_command": "pnpm install"}"#).unwrap();
        assert_eq!(config.install_command, "pnpm install");
        assert_eq!(config.manifest, "package.json");
        assert_eq!(config.cache_dirs, vec!["node_modules"]);
        assert!(config.env.is_empty());
    }
}
