//! Installing the proxy binary through Homebrew

use std::process::Stdio;

use shared::{Component, component_info};
use tokio::process::Command;

use crate::core::{BINARY_NAME, BinaryLocator};
use crate::error::{VexarError, VexarResult};
use crate::traits::Installer;

pub struct HomebrewInstaller {
    formula: String,
    binary: BinaryLocator,
    brew: BinaryLocator,
}

impl HomebrewInstaller {
    pub fn new(binary: BinaryLocator) -> Self {
        Self {
            formula: BINARY_NAME.to_string(),
            binary,
            brew: BinaryLocator::package_manager("brew"),
        }
    }
}

#[async_trait::async_trait]
impl Installer for HomebrewInstaller {
    fn is_installed(&self) -> bool {
        self.binary.find_binary().is_some()
    }

    async fn install(&self) -> VexarResult<()> {
        let brew = self
            .brew
            .find_binary()
            .ok_or_else(|| VexarError::install("Homebrew not found. Install it from https://brew.sh"))?;

        component_info!(Component::App, "📦 Running {} install {}", brew.display(), self.formula);
        let output = Command::new(&brew)
            .args(["install", &self.formula])
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(VexarError::install(format!(
            "brew exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}
