//! Package-manager adapter that shells out to the configured installer
//! (e.g. `pip`). The installer's exit status is the whole contract.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use burrowbot_common::traits::platform_traits::PackageManager;
use burrowbot_core::Error;

pub struct ShellPackageManager {
    program: String,
}

impl ShellPackageManager {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

#[async_trait]
impl PackageManager for ShellPackageManager {
    async fn is_installed(&self, package: &str) -> Result<bool, Error> {
        let status = Command::new(&self.program)
            .arg("show")
            .arg(package)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        debug!("{} show {} => {:?}", self.program, package, status.code());
        Ok(status.success())
    }

    async fn install_package(&self, package: &str) -> Result<i32, Error> {
        let status = Command::new(&self.program)
            .arg("install")
            .arg(package)
            .status()
            .await?;
        Ok(status.code().unwrap_or(-1))
    }
}
