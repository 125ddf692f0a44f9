//! EC2-style cloud instances.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{InstanceApi, InstanceDescription, LaunchRequest, Provisioner, check_dry_run};
use crate::{
    error::{ApiError, ProvisionError, ProvisionResult, TargetError, TargetResult},
    target::{HardReset, PlatformKind, Target, TargetOs},
};

const DEFAULT_REGION: &str = "us-east-2";

/// Port adb listens on for android instances.
const ADB_PORT: u16 = 5555;

/// Resolve the credentials file using the priority order:
/// 1. AWS_SHARED_CREDENTIALS_FILE environment variable (if set)
/// 2. ${HOME}/.aws/credentials (if HOME is set)
/// 3. .aws/credentials (default fallback)
pub fn resolve_credentials_path() -> PathBuf {
    std::env::var("AWS_SHARED_CREDENTIALS_FILE")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".aws/credentials")))
        .unwrap_or_else(|_| PathBuf::from(".aws/credentials"))
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Configuration for [`Ec2Provisioner`].
///
/// Every field has a default, so a config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2Config {
    /// Region to operate in. Sent with every launch request.
    pub region: String,
    /// Path to the credentials file.
    pub aws_credentials: PathBuf,
    /// Launch a new instance on init.
    pub launch_new: bool,
    /// Stop the instance on teardown.
    pub stop_instance: bool,
    /// Terminate the instance on teardown. Takes precedence over `stop_instance`.
    pub terminate_instance: bool,
    /// Image to launch. Required with `launch_new`.
    pub image_id: Option<String>,
    /// Instance type to launch. Required with `launch_new`.
    pub instance_type: Option<String>,
    /// Key pair installed on launched instances.
    pub key_name: Option<String>,
    /// Security groups attached to launched instances.
    pub security_groups: Vec<String>,
    /// Subnet launched instances join.
    pub subnet_id: Option<String>,
    /// An existing instance to use when not launching.
    pub instance_id: Option<String>,
}

impl Default for Ec2Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            aws_credentials: resolve_credentials_path(),
            launch_new: false,
            stop_instance: false,
            terminate_instance: false,
            image_id: None,
            instance_type: None,
            key_name: None,
            security_groups: Vec::new(),
            subnet_id: None,
            instance_id: None,
        }
    }
}

impl Ec2Config {
    /// Check the configuration before any API call is made.
    pub fn validate(&self) -> ProvisionResult<()> {
        if !self.aws_credentials.exists() {
            return Err(ProvisionError::Config(format!(
                "cannot find credentials file '{}'",
                self.aws_credentials.display()
            )));
        }
        if self.launch_new {
            if self.image_id.is_none() {
                return Err(ProvisionError::Config("please provide an image_id to launch".into()));
            }
            if self.instance_type.is_none() {
                return Err(ProvisionError::Config(
                    "please provide an instance_type to launch".into(),
                ));
            }
        }
        Ok(())
    }

    fn launch_request(&self) -> LaunchRequest {
        LaunchRequest {
            region: self.region.clone(),
            image_id: self.image_id.clone().unwrap_or_default(),
            instance_type: self.instance_type.clone().unwrap_or_default(),
            key_name: self.key_name.clone(),
            security_groups: self.security_groups.clone(),
            subnet_id: self.subnet_id.clone(),
        }
    }
}

/// Provisions cloud instances as targets.
pub struct Ec2Provisioner<A> {
    config: Ec2Config,
    api: Arc<A>,
    instance: Mutex<Option<InstanceDescription>>,
}

impl<A: InstanceApi> Ec2Provisioner<A> {
    /// Create a provisioner, validating `config` first.
    pub fn new(config: Ec2Config, api: Arc<A>) -> ProvisionResult<Self> {
        config.validate()?;
        Ok(Self { config, api, instance: Mutex::new(None) })
    }

    /// The provisioner configuration.
    pub fn config(&self) -> &Ec2Config {
        &self.config
    }

    /// The instance launched by the last `init_target_connection`, if any.
    pub fn instance(&self) -> Option<InstanceDescription> {
        self.instance.lock().clone()
    }

    /// Id of the instance this provisioner manages.
    pub fn instance_id(&self) -> Option<String> {
        self.instance
            .lock()
            .as_ref()
            .map(|i| i.instance_id.clone())
            .or_else(|| self.config.instance_id.clone())
    }

    /// Create a key pair named `name` and write its private key to `path`.
    ///
    /// On unix the key file is made readable by its owner only.
    pub async fn create_key_pair(&self, name: &str, path: &Path) -> ProvisionResult<PathBuf> {
        let material = self.api.create_key_pair(name).await?;

        macro_rules! map_err {
            ($expr:expr) => {
                $expr.map_err(|e| ProvisionError::Io { path: path.to_path_buf(), source: e })?
            };
        }

        map_err!(fs::write(path, material));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            map_err!(fs::set_permissions(path, fs::Permissions::from_mode(0o400)));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(key = name, path = %path.display(), "key pair written");
        Ok(path.to_path_buf())
    }

    fn managed_ids(&self, target: &Target) -> ProvisionResult<Vec<String>> {
        self.instance_id()
            .or_else(|| target.platform().instance_id().map(str::to_string))
            .map(|id| vec![id])
            .ok_or_else(|| {
                ProvisionError::Config(format!("no instance known for target '{}'", target.name()))
            })
    }
}

#[async_trait]
impl<A: InstanceApi> Provisioner for Ec2Provisioner<A> {
    async fn init_target_connection(&self, target: &mut Target) -> ProvisionResult<()> {
        if !self.config.launch_new {
            if let Some(id) = &self.config.instance_id {
                target.platform_mut().set_instance_id(id.clone());
            }
            return Ok(());
        }

        let instance = self.api.run_instance(&self.config.launch_request()).await?;
        let address = instance
            .address()
            .ok_or_else(|| TargetError::Stable("Could not detect instance IP Address".into()))?
            .to_string();

        let (key, value) = match target.os() {
            TargetOs::Linux => ("host", address),
            TargetOs::Android => ("device", format!("{address}:{ADB_PORT}")),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(instance = %instance.instance_id, host = target.name(), %key, %value, "instance launched");

        target.connection_settings_mut().insert(key.to_string(), value);
        target.platform_mut().set_instance_id(instance.instance_id.clone());
        *self.instance.lock() = Some(instance);
        Ok(())
    }

    async fn teardown_target_connection(&self, target: &Target) -> ProvisionResult<()> {
        if self.config.terminate_instance {
            let ids = self.managed_ids(target)?;
            self.api.terminate_instances(&ids).await?;

            #[cfg(feature = "tracing")]
            tracing::info!(instances = ?ids, "instances terminating");
        } else if self.config.stop_instance {
            let ids = self.managed_ids(target)?;
            check_dry_run(self.api.stop_instances(&ids, true)).await?;
            self.api.stop_instances(&ids, false).await?;

            #[cfg(feature = "tracing")]
            tracing::info!(instances = ?ids, "instances stopping");
        }
        Ok(())
    }
}

/// Reboots a cloud instance through the instance API.
pub struct Ec2HardReset<A> {
    api: Arc<A>,
}

impl<A: InstanceApi> Ec2HardReset<A> {
    /// Create a hard reset that uses `api`.
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<A: InstanceApi> HardReset for Ec2HardReset<A> {
    fn name(&self) -> &str {
        "aws-restart"
    }

    fn probe(&self, target: &Target) -> bool {
        target.platform().kind() == PlatformKind::Aws
    }

    async fn hard_reset(&self, target: &Target) -> TargetResult<()> {
        let id = target.platform().instance_id().ok_or_else(|| {
            TargetError::Stable(format!("target '{}' has no instance id", target.name()))
        })?;
        let ids = [id.to_string()];

        if let Err(_e) = check_dry_run(self.api.reboot_instances(&ids, true)).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(instance = id, error = %_e, "reboot dry run refused");
            return Err(TargetError::Stable(
                "You don't have permission to reboot instances.".into(),
            ));
        }

        self.api.reboot_instances(&ids, false).await.map_err(|e: ApiError| {
            #[cfg(feature = "tracing")]
            tracing::error!(instance = id, error = %e, "error rebooting instance");
            TargetError::Transient(format!("error rebooting instance '{id}': {e}"))
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!(instance = id, "instance rebooting");
        Ok(())
    }
}
