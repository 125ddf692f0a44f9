//! The device or host a collector operates against.
//!
//! A [`Target`] carries identity (name, OS, [`Platform`]), the `connection_settings`
//! mapping that a provisioner fills in, and an optional [`Connection`] that gives
//! collectors command execution and file transfer.
//!
//! Several collectors may share one target through an `Arc<Target>`. Connections must
//! be `Send + Sync`; coordinating conflicting commands from different collectors is the
//! caller's responsibility.
mod hard_reset;
mod local;
#[cfg(test)]
pub(crate) mod testing;

use std::{collections::BTreeMap, fmt, path::Path};

use serde::{Deserialize, Serialize};

pub use hard_reset::HardReset;
pub use local::LocalConnection;

use crate::error::{TargetError, TargetResult};

/// Key/value settings used to reach a target, e.g. `host` or `device`.
pub type ConnectionSettings = BTreeMap<String, String>;

/// Operating system family of a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    /// Linux host or board, reached via `host`.
    #[default]
    Linux,
    /// Android device, reached via `device`.
    Android,
}

/// The kind of platform a target runs on. Hard reset implementations inspect this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Physical board or local host.
    #[default]
    Generic,
    /// AWS EC2 instance.
    Aws,
}

/// Description of the platform underneath a target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    name: String,
    kind: PlatformKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_id: Option<String>,
}

impl Platform {
    /// Create a platform description.
    pub fn new(name: impl Into<String>, kind: PlatformKind) -> Self {
        Self { name: name.into(), kind, instance_id: None }
    }

    /// Platform name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Platform kind.
    pub fn kind(&self) -> PlatformKind {
        self.kind
    }

    /// Identifier of the running cloud instance, once provisioned.
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Record the identifier of the running cloud instance.
    pub fn set_instance_id(&mut self, id: impl Into<String>) {
        self.instance_id = Some(id.into());
    }
}

/// Command execution and file transfer against a target.
pub trait Connection: Send + Sync {
    /// Run `command` to completion and return its standard output.
    fn execute(&self, command: &str) -> TargetResult<String>;

    /// Start `command` in the background, capturing its standard output.
    fn background(&self, command: &str) -> TargetResult<Box<dyn BackgroundCommand>>;

    /// Copy a file or directory from the target to `dest` on the host.
    fn pull(&self, source: &str, dest: &Path) -> TargetResult<()>;
}

/// A command running in the background on a target.
pub trait BackgroundCommand: Send {
    /// Returns `true` while the command has not exited.
    fn is_running(&mut self) -> TargetResult<bool>;

    /// Stop the command and return everything it wrote to standard output.
    fn terminate(self: Box<Self>) -> TargetResult<Vec<u8>>;
}

/// The device or host under test.
pub struct Target {
    name: String,
    os: TargetOs,
    platform: Platform,
    connection_settings: ConnectionSettings,
    connection: Option<Box<dyn Connection>>,
}

impl Target {
    /// Create a target without a connection.
    pub fn new(name: impl Into<String>, os: TargetOs, platform: Platform) -> Self {
        Self {
            name: name.into(),
            os,
            platform,
            connection_settings: ConnectionSettings::new(),
            connection: None,
        }
    }

    /// Create a generic Linux target for the local host.
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, TargetOs::Linux, Platform::new("local", PlatformKind::Generic))
    }

    /// Attach a connection, builder style.
    pub fn with_connection(mut self, connection: impl Connection + 'static) -> Self {
        self.connect(connection);
        self
    }

    /// Attach a connection, replacing any previous one.
    pub fn connect(&mut self, connection: impl Connection + 'static) {
        self.connection = Some(Box::new(connection));
    }

    /// Detach the current connection.
    pub fn disconnect(&mut self) {
        self.connection = None;
    }

    /// Returns `true` if a connection is attached.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operating system family.
    pub fn os(&self) -> TargetOs {
        self.os
    }

    /// Platform description.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Mutable platform description.
    pub fn platform_mut(&mut self) -> &mut Platform {
        &mut self.platform
    }

    /// Settings used to reach the target.
    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.connection_settings
    }

    /// Mutable settings used to reach the target.
    pub fn connection_settings_mut(&mut self) -> &mut ConnectionSettings {
        &mut self.connection_settings
    }

    /// Run `command` on the target and return its standard output.
    pub fn execute(&self, command: &str) -> TargetResult<String> {
        self.connection()?.execute(command)
    }

    /// Start `command` in the background on the target.
    pub fn background(&self, command: &str) -> TargetResult<Box<dyn BackgroundCommand>> {
        self.connection()?.background(command)
    }

    /// Copy `source` from the target to `dest` on the host.
    pub fn pull(&self, source: &str, dest: &Path) -> TargetResult<()> {
        self.connection()?.pull(source, dest)
    }

    fn connection(&self) -> TargetResult<&dyn Connection> {
        self.connection
            .as_deref()
            .ok_or_else(|| TargetError::NotConnected(self.name.clone()))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("os", &self.os)
            .field("platform", &self.platform)
            .field("connection_settings", &self.connection_settings)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::testing::FakeConnection;

    #[test]
    fn test_unconnected_target_fails() {
        let target = Target::local("board");
        let err = target.execute("true").unwrap_err();
        assert!(matches!(err, TargetError::NotConnected(ref name) if name == "board"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_execute_goes_through_connection() {
        let conn = FakeConnection::new().with_output("uname -r", "6.1.0\n");
        let target = Target::local("board").with_connection(conn.clone());

        assert_eq!(target.execute("uname -r").unwrap(), "6.1.0\n");
        assert_eq!(conn.commands(), vec!["uname -r".to_string()]);
    }

    #[test]
    fn test_connection_settings_and_platform() {
        let mut target =
            Target::new("cloud", TargetOs::Android, Platform::new("aws", PlatformKind::Aws));
        target.connection_settings_mut().insert("device".into(), "10.0.0.1:5555".into());
        target.platform_mut().set_instance_id("i-0123");

        assert_eq!(target.connection_settings()["device"], "10.0.0.1:5555");
        assert_eq!(target.platform().instance_id(), Some("i-0123"));
        assert_eq!(target.platform().kind().to_string(), "aws");
        assert_eq!(target.os().to_string(), "android");
    }
}
