//! Manifest parser and settings loader.
//!
//! A manifest is a YAML document describing one node. Content in a
//! manifest is an exact string; richer content policies are only
//! available through the library API.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{InputError, NodeStateError, Result};

use super::spec::{ContentPolicy, DesiredState, NodeKind, Presence, ReplacePolicy, Settings};

/// Environment variable overriding the scratch directory.
pub const ENV_SCRATCH_DIR: &str = "NODESTATE_SCRATCH_DIR";

/// Environment variable toggling retention of removed nodes.
pub const ENV_RETAIN: &str = "NODESTATE_RETAIN";

/// On-disk manifest shape.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    path: PathBuf,
    #[serde(default)]
    state: Presence,
    #[serde(default, rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    mode: Option<ModeValue>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    allow_symlink: bool,
    #[serde(default)]
    replace: ReplacePolicy,
}

/// A mode as written in the manifest.
///
/// YAML decodes `0o640`, `0x1a0` and `640` to plain integers before we see
/// them, so only quoted modes are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModeValue {
    Text(String),
    Number(serde_yaml::Number),
}

impl ModeValue {
    fn into_spec(self) -> std::result::Result<String, InputError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Number(number) => Err(InputError::parse(
                "manifest",
                format!("mode {number} must be quoted, e.g. mode: \"0644\" or mode: \"u+x\""),
            )),
        }
    }
}

impl TryFrom<Manifest> for DesiredState {
    type Error = InputError;

    fn try_from(manifest: Manifest) -> std::result::Result<Self, Self::Error> {
        let mut desired = Self::new(manifest.path)
            .with_presence(manifest.state)
            .with_kind(manifest.kind)
            .with_allow_symlink(manifest.allow_symlink)
            .with_replace(manifest.replace);

        if let Some(mode) = manifest.mode {
            desired = desired.with_mode(mode.into_spec()?);
        }
        if let Some(owner) = manifest.owner {
            desired = desired.with_owner(owner);
        }
        if let Some(group) = manifest.group {
            desired = desired.with_group(group);
        }
        if let Some(content) = manifest.content {
            desired = desired.with_content(ContentPolicy::exact(content));
        }
        Ok(desired)
    }
}

/// Parser for manifests and settings.
#[derive(Debug, Default)]
pub struct ConfigParser;

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads a desired state from a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DesiredState> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(NodeStateError::Input(InputError::ManifestNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeStateError::Input(InputError::parse(
                path.display().to_string(),
                format!("Failed to read file: {e}"),
            ))
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a desired state from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DesiredState> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            let what = source.map_or_else(|| String::from("manifest"), |p| p.display().to_string());
            NodeStateError::Input(InputError::parse(what, format!("YAML parse error: {e}")))
        })?;

        debug!("Parsed manifest for {}", manifest.path.display());
        Ok(DesiredState::try_from(manifest)?)
    }

    /// Builds engine settings from flags and the environment.
    ///
    /// Flags win over environment variables, which win over defaults.
    #[must_use]
    pub fn load_settings(&self, scratch_dir: Option<PathBuf>, no_retain: bool) -> Settings {
        Self::settings_from(scratch_dir, no_retain, |name| std::env::var(name).ok())
    }

    fn settings_from(
        scratch_dir: Option<PathBuf>,
        no_retain: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Settings {
        let scratch_dir = scratch_dir
            .or_else(|| {
                env(ENV_SCRATCH_DIR).filter(|v| !v.is_empty()).map(|v| {
                    debug!("Using scratch directory from {ENV_SCRATCH_DIR}");
                    PathBuf::from(v)
                })
            })
            .unwrap_or_else(Settings::default_scratch_dir);

        let retain = !no_retain && env(ENV_RETAIN).is_none_or(|v| !is_disabled(&v));

        Settings::new(scratch_dir).with_retain_removed(retain)
    }
}

fn is_disabled(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = "path: /etc/motd\n";
        let desired = ConfigParser::new().parse_yaml(yaml, None).expect("parse failed");

        assert_eq!(desired.path(), Path::new("/etc/motd"));
        assert_eq!(desired.presence, Presence::Present);
        assert_eq!(desired.kind, NodeKind::File);
        assert!(desired.mode.is_none());
        assert!(desired.content.is_empty());
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
path: /srv/app/config
state: present
type: directory
mode: "u=rwx,go=rx"
owner: root
group: "0"
allow_symlink: true
replace:
  file: true
"#;
        let desired = ConfigParser::new().parse_yaml(yaml, None).expect("parse failed");

        assert_eq!(desired.kind, NodeKind::Directory);
        assert_eq!(desired.mode.as_deref(), Some("u=rwx,go=rx"));
        assert_eq!(desired.owner.as_deref(), Some("root"));
        assert_eq!(desired.group.as_deref(), Some("0"));
        assert!(desired.allow_symlink);
        assert!(desired.replace.file);
        assert!(!desired.replace.directory);
        assert!(!desired.replace.symlink);
    }

    #[test]
    fn test_content_is_exact() {
        let yaml = "path: /tmp/x\ncontent: abc\n";
        let desired = ConfigParser::new().parse_yaml(yaml, None).expect("parse failed");

        assert!(desired.content.accepts(b"abc"));
        assert!(!desired.content.accepts(b"abd"));
        assert_eq!(desired.content.generate(None), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_quoted_octal_mode() {
        let yaml = "path: /tmp/x\nmode: \"0640\"\n";
        let desired = ConfigParser::new().parse_yaml(yaml, None).expect("parse failed");
        assert_eq!(desired.mode.as_deref(), Some("0640"));
    }

    #[test]
    fn test_unquoted_modes_rejected() {
        for literal in ["0o640", "0x1a0", "640"] {
            let yaml = format!("path: /tmp/x\nmode: {literal}\n");
            let result = ConfigParser::new().parse_yaml(&yaml, None);
            match result {
                Err(NodeStateError::Input(InputError::Parse { message, .. })) => {
                    assert!(message.contains("quoted"), "{literal}: {message}");
                }
                other => panic!("{literal} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "path: /tmp/x\ncolour: blue\n";
        let result = ConfigParser::new().parse_yaml(yaml, None);
        assert!(matches!(
            result,
            Err(NodeStateError::Input(InputError::Parse { .. }))
        ));
    }

    #[test]
    fn test_missing_manifest() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let result = ConfigParser::new().load_file(temp.path().join("missing.yaml"));
        assert!(matches!(
            result,
            Err(NodeStateError::Input(InputError::ManifestNotFound { .. }))
        ));
    }

    #[test]
    fn test_load_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let file = temp.path().join("node.yaml");
        std::fs::write(&file, "path: /tmp/x\nstate: absent\n").expect("write failed");

        let desired = ConfigParser::new().load_file(&file).expect("load failed");
        assert_eq!(desired.presence, Presence::Absent);
    }

    #[test]
    fn test_settings_precedence() {
        let env = |name: &str| match name {
            ENV_SCRATCH_DIR => Some(String::from("/var/tmp/from-env")),
            ENV_RETAIN => Some(String::from("yes")),
            _ => None,
        };

        let from_env = ConfigParser::settings_from(None, false, env);
        assert_eq!(from_env.scratch_dir, PathBuf::from("/var/tmp/from-env"));
        assert!(from_env.retain_removed);

        let from_flag = ConfigParser::settings_from(Some(PathBuf::from("/flag")), true, env);
        assert_eq!(from_flag.scratch_dir, PathBuf::from("/flag"));
        assert!(!from_flag.retain_removed);
    }

    #[test]
    fn test_retention_disabled_by_env() {
        for value in ["0", "false", "No", "off"] {
            let settings = ConfigParser::settings_from(None, false, |name: &str| {
                (name == ENV_RETAIN).then(|| value.to_string())
            });
            assert!(!settings.retain_removed, "{value} should disable retention");
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ConfigParser::settings_from(None, false, |_: &str| None);
        assert_eq!(settings, Settings::default());
    }
}
