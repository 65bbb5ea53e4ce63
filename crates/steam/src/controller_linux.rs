//! Linux-specific Steam controller implementation.

use std::process::Stdio;

use tokio::process::Command;

use crate::SteamError;
use crate::controller::{COMMAND_TIMEOUT, FLATPAK_APP_ID, SteamPlatform, SteamProcesses};
use crate::env::EnvOverride;

const OS_RELEASE: &str = "/etc/os-release";
const DMI_PRODUCT_NAME: &str = "/sys/devices/virtual/dmi/id/product_name";

/// [`SteamProcesses`] backed by `pgrep`, `pkill` and real spawns.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxProcesses;

impl LinuxProcesses {
    pub fn new() -> Self {
        Self
    }
}

impl SteamProcesses for LinuxProcesses {
    async fn steam_running(&self) -> bool {
        pgrep("steam").await
    }

    async fn webhelper_running(&self) -> bool {
        pgrep("steamwebhelper").await
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<(), SteamError> {
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SteamError::Timeout(format!("{program} did not finish")))?
        .map_err(|e| SteamError::Controller(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            return Err(SteamError::Controller(format!(
                "{program} {} exited with {}",
                args.join(" "),
                output.status
            )));
        }
        Ok(())
    }

    async fn spawn(
        &self,
        program: &str,
        args: &[&str],
        env: &EnvOverride,
    ) -> Result<(), SteamError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        env.apply_to(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| SteamError::Controller(format!("failed to start {program}: {e}")))?;

        // Reap the child in the background so it never lingers as a zombie.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(())
    }
}

/// `pgrep -f <pattern>` succeeded with at least one PID.
async fn pgrep(pattern: &str) -> bool {
    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new("pgrep").args(["-f", pattern]).output(),
    )
    .await;

    match output {
        Ok(Ok(o)) => o.status.success() && !o.stdout.is_empty(),
        _ => false,
    }
}

/// Detects how Steam is installed. Steam Deck wins over Flatpak.
pub async fn detect_platform() -> SteamPlatform {
    if is_steam_deck() {
        tracing::info!("detected Steam Deck");
        return SteamPlatform::SteamDeck;
    }
    if is_flatpak_steam().await {
        tracing::info!("detected Flatpak Steam");
        return SteamPlatform::Flatpak;
    }
    SteamPlatform::Native
}

fn is_steam_deck() -> bool {
    let os_release = std::fs::read_to_string(OS_RELEASE).unwrap_or_default();
    let product = std::fs::read_to_string(DMI_PRODUCT_NAME).unwrap_or_default();
    let runtime_on_deck_home = std::env::var_os("STEAM_RUNTIME").is_some_and(|v| !v.is_empty())
        && std::path::Path::new("/home/deck").exists();
    deck_markers(&os_release, &product) || runtime_on_deck_home
}

fn deck_markers(os_release: &str, product_name: &str) -> bool {
    let os_release = os_release.to_lowercase();
    os_release.contains("steamos")
        || os_release.contains("steam deck")
        || product_name.to_lowercase().contains("steam deck")
}

async fn is_flatpak_steam() -> bool {
    let output = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        Command::new("flatpak")
            .args(["list", "--app"])
            .stderr(Stdio::null())
            .output(),
    )
    .await;

    match output {
        Ok(Ok(o)) if o.status.success() => {
            String::from_utf8_lossy(&o.stdout).contains(FLATPAK_APP_ID)
        }
        _ => false,
    }
}
