//! Typed target directives.
//!
//! A [`Directive`] is one flag/value fragment produced while translating a
//! service. The swarm emitter renders directives as shell-quoted CLI flags;
//! the manifest emitter reads their typed payload directly.

use crate::error::{ComposeError, Result};

/// Kind of mount a volume entry produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Host path bind mount.
    Bind,
    /// Named volume.
    Volume,
}

/// A volume mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Bind or named volume.
    pub kind: MountKind,
    /// Absolute host path or (prefixed) volume name.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl Mount {
    /// Renders the mount in `--mount` syntax.
    #[must_use]
    pub fn spec(&self) -> String {
        let readonly = u8::from(self.read_only);
        match self.kind {
            MountKind::Bind => format!(
                "type=bind,src={},dst={},readonly={readonly}",
                self.source, self.target
            ),
            MountKind::Volume => format!("src={},dst={},readonly={readonly}", self.source, self.target),
        }
    }
}

/// One translated service directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Restart condition (`any` for `restart: always`).
    RestartCondition(String),
    /// Logging driver.
    LogDriver(String),
    /// Logging driver option as `key=value`.
    LogOpt(String),
    /// Memory limit, verbatim.
    MemoryLimit(String),
    /// Replica count, verbatim.
    Replicas(String),
    /// Published port.
    Publish(String),
    /// Attached network, already prefixed where required.
    Network(String),
    /// Volume mount.
    Mount(Mount),
    /// Environment entry as `KEY=value` or `KEY`.
    Env(String),
    /// Placement constraint expression.
    Constraint(String),
    /// Service label as `key=value`.
    Label(String),
    /// Service mode.
    Mode(String),
    /// Exposed container port.
    Expose(String),
    /// Container hostname.
    Hostname(String),
    /// Container name.
    ContainerName(String),
    /// Extra `/etc/hosts` entry as `host:ip`.
    ExtraHost(String),
}

impl Directive {
    /// Returns the swarm CLI flag for this directive.
    ///
    /// Directives the swarm CLI cannot express return `None`.
    #[must_use]
    pub const fn cli_flag(&self) -> Option<&'static str> {
        match self {
            Self::RestartCondition(_) => Some("--restart-condition"),
            Self::LogDriver(_) => Some("--log-driver"),
            Self::LogOpt(_) => Some("--log-opt"),
            Self::MemoryLimit(_) => Some("--limit-memory"),
            Self::Replicas(_) => Some("--replicas"),
            Self::Publish(_) => Some("--publish"),
            Self::Network(_) => Some("--network"),
            Self::Mount(_) => Some("--mount"),
            Self::Env(_) => Some("--env"),
            Self::Constraint(_) => Some("--constraint"),
            Self::Label(_) => Some("--label"),
            Self::Mode(_) => Some("--mode"),
            Self::Expose(_) | Self::Hostname(_) | Self::ContainerName(_) | Self::ExtraHost(_) => None,
        }
    }

    /// Returns the unquoted directive value.
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::Mount(mount) => mount.spec(),
            Self::RestartCondition(v)
            | Self::LogDriver(v)
            | Self::LogOpt(v)
            | Self::MemoryLimit(v)
            | Self::Replicas(v)
            | Self::Publish(v)
            | Self::Network(v)
            | Self::Env(v)
            | Self::Constraint(v)
            | Self::Label(v)
            | Self::Mode(v)
            | Self::Expose(v)
            | Self::Hostname(v)
            | Self::ContainerName(v)
            | Self::ExtraHost(v) => v.clone(),
        }
    }

    /// Renders the directive as a shell-safe `--flag value` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be quoted for the shell.
    pub fn to_cli(&self) -> Result<Option<String>> {
        self.cli_flag()
            .map(|flag| -> Result<String> { Ok(format!("{flag} {}", quote(&self.value())?)) })
            .transpose()
    }
}

/// Quotes a value for safe inclusion in a `sh -c` command line.
///
/// Values made only of shell-safe characters are returned unchanged.
///
/// # Errors
///
/// Returns an error if the value contains a NUL byte.
pub fn quote(value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ComposeError::internal(format!("Cannot quote '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_spec() {
        let bind = Mount {
            kind: MountKind::Bind,
            source: String::from("/srv/app/data"),
            target: String::from("/var/data"),
            read_only: true,
        };
        assert_eq!(bind.spec(), "type=bind,src=/srv/app/data,dst=/var/data,readonly=1");

        let named = Mount {
            kind: MountKind::Volume,
            source: String::from("app_db"),
            target: String::from("/var/lib/db"),
            read_only: false,
        };
        assert_eq!(named.spec(), "src=app_db,dst=/var/lib/db,readonly=0");
    }

    #[test]
    fn test_to_cli_quotes_unsafe_values() {
        let env = Directive::Env(String::from("GREETING=hello world"));
        let rendered = env.to_cli().expect("quote failed").expect("flag missing");
        assert!(rendered.starts_with("--env "));
        assert_ne!(rendered, "--env GREETING=hello world");
        assert!(rendered.contains("hello world"));

        let constraint = Directive::Constraint(String::from("node.role==manager"));
        let rendered = constraint.to_cli().expect("quote failed").expect("flag missing");
        assert!(rendered.starts_with("--constraint "));
        assert!(rendered.contains("node.role==manager"));
    }

    #[test]
    fn test_safe_values_pass_through() {
        let replicas = Directive::Replicas(String::from("3"));
        assert_eq!(
            replicas.to_cli().expect("quote failed"),
            Some(String::from("--replicas 3"))
        );
    }

    #[test]
    fn test_cli_unsupported_directives() {
        assert_eq!(Directive::Hostname(String::from("db")).cli_flag(), None);
        assert_eq!(Directive::Expose(String::from("80")).to_cli().expect("quote failed"), None);
    }

    #[test]
    fn test_quote_rejects_nul() {
        assert!(quote("a\0b").is_err());
    }
}
