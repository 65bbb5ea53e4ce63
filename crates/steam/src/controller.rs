//! Steam process controller: shutdown, start and startup verification.
//!
//! One restart walks `Idle → ShuttingDown → Stopped → Starting →
//! Verifying → Running`, or ends in `Failed` at whichever step gave up.
//! Process inspection and spawning go through [`SteamProcesses`]; the
//! Linux implementation lives in `controller_linux.rs`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use crate::SteamError;
use crate::config::RestartStrategy;
use crate::env::EnvOverride;

/// systemd user unit that runs Steam on a Steam Deck.
pub const DECK_SERVICE: &str = "app-steam@autostart.service";

/// Flatpak application ID of Steam.
pub const FLATPAK_APP_ID: &str = "com.valvesoftware.Steam";

/// Upper bound for a single shutdown command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Pause after each kill before checking the process table again.
pub const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Wait between spawning Steam and probing for its process.
pub const SPAWN_PROBE: Duration = Duration::from_secs(5);

/// Flatpak's sandbox takes longer to come up.
pub const FLATPAK_SPAWN_PROBE: Duration = Duration::from_secs(7);

/// Poll interval while verifying startup.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long Steam must stay up after first detection.
pub const STABILIZE_WINDOW: Duration = Duration::from_secs(15);

/// Overall bound on startup verification.
pub const START_TIMEOUT: Duration = Duration::from_secs(120);

/// Steps of a restart cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartState {
    Idle,
    ShuttingDown,
    Stopped,
    Starting,
    Verifying,
    Running,
    Failed,
}

/// Which step a failed restart gave up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartFailure {
    /// Steam would not stop, even after `pkill -9`.
    Shutdown,
    /// No launch method produced a Steam process.
    Start,
    /// Steam never stayed up for the stabilisation window.
    Stabilize,
}

/// Result of a Steam restart operation.
#[derive(Debug, Clone)]
pub struct RestartResult {
    pub success: bool,
    pub message: String,
    pub failure: Option<RestartFailure>,
    /// Every state entered, starting with `Idle`.
    pub transitions: Vec<RestartState>,
}

impl RestartResult {
    /// The state the restart ended in.
    pub fn final_state(&self) -> RestartState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RestartState::Idle)
    }
}

/// How Steam is installed, which decides the stop and start commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteamPlatform {
    SteamDeck,
    Flatpak,
    Native,
}

/// Process-table and launcher operations used by [`Controller`].
#[allow(async_fn_in_trait)]
pub trait SteamProcesses {
    /// Any process whose command line mentions `steam`.
    async fn steam_running(&self) -> bool;

    /// Any `steamwebhelper` process.
    async fn webhelper_running(&self) -> bool;

    /// Runs a command to completion, bounded by [`COMMAND_TIMEOUT`].
    async fn run(&self, program: &str, args: &[&str]) -> Result<(), SteamError>;

    /// Starts a detached command without waiting for it.
    async fn spawn(&self, program: &str, args: &[&str], env: &EnvOverride)
    -> Result<(), SteamError>;
}

/// Drives one restart cycle at a time.
pub struct Controller<P> {
    processes: P,
    platform: SteamPlatform,
    strategy: RestartStrategy,
    start_env: Option<EnvOverride>,
}

impl<P: SteamProcesses> Controller<P> {
    pub fn new(processes: P, platform: SteamPlatform, strategy: RestartStrategy) -> Self {
        Self {
            processes,
            platform,
            strategy,
            start_env: None,
        }
    }

    /// Environment for launching Steam under the hardened strategy.
    /// Defaults to [`EnvOverride::clean_for_steam_from_current`].
    pub fn with_start_env(mut self, env: EnvOverride) -> Self {
        self.start_env = Some(env);
        self
    }

    pub fn platform(&self) -> SteamPlatform {
        self.platform
    }

    pub fn strategy(&self) -> RestartStrategy {
        self.strategy
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    /// Returns `true` if a Steam process is currently running.
    pub async fn is_running(&self) -> bool {
        self.processes.steam_running().await
    }

    /// Full restart cycle. `progress` receives a message at each step; a
    /// panicking callback is logged and otherwise ignored.
    pub async fn restart(&self, progress: &mut dyn FnMut(&str)) -> RestartResult {
        tracing::info!(
            platform = ?self.platform,
            strategy = self.strategy.label(),
            "restarting Steam"
        );
        let mut cycle = Cycle {
            transitions: vec![RestartState::Idle],
            progress,
        };

        cycle.enter(RestartState::ShuttingDown, "Shutting down Steam...");
        if let Err(message) = self.shutdown(&mut cycle).await {
            return cycle.fail(RestartFailure::Shutdown, message);
        }
        cycle.enter(RestartState::Stopped, "Steam closed successfully.");

        cycle.enter(RestartState::Starting, "Starting Steam...");
        if !self.start().await {
            return cycle.fail(RestartFailure::Start, "Failed to start Steam.");
        }

        cycle.enter(RestartState::Verifying, "Waiting for Steam to fully start");
        if let Err(message) = self.verify().await {
            return cycle.fail(RestartFailure::Stabilize, message);
        }

        cycle.enter(RestartState::Running, "Steam started successfully.");
        cycle.finish()
    }

    /// Runs [`Controller::restart`] on a private current-thread runtime.
    ///
    /// Must not be called from inside an async context.
    pub fn restart_blocking(&self, progress: &mut dyn FnMut(&str)) -> RestartResult {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("failed to build runtime for restart: {e}");
                return RestartResult {
                    success: false,
                    message: format!("failed to start restart runtime: {e}"),
                    failure: Some(RestartFailure::Start),
                    transitions: vec![RestartState::Idle, RestartState::Failed],
                };
            }
        };
        runtime.block_on(self.restart(progress))
    }

    async fn shutdown(&self, cycle: &mut Cycle<'_>) -> Result<(), &'static str> {
        match self.platform {
            SteamPlatform::SteamDeck => {
                cycle.report("Steam Deck detected - using systemctl shutdown...");
                self.run_logged("systemctl", &["--user", "stop", DECK_SERVICE])
                    .await;
                tokio::time::sleep(KILL_SETTLE).await;
            }
            SteamPlatform::Flatpak => {
                cycle.report("Flatpak Steam detected - stopping via flatpak...");
                self.run_logged("flatpak", &["kill", FLATPAK_APP_ID]).await;
                tokio::time::sleep(KILL_SETTLE).await;
            }
            SteamPlatform::Native => {}
        }

        self.run_logged("pkill", &["steam"]).await;
        tokio::time::sleep(KILL_SETTLE).await;

        if self.processes.webhelper_running().await {
            cycle.report("Steam processes still running - force terminating...");
            self.run_logged("pkill", &["-9", "steam"]).await;
            tokio::time::sleep(KILL_SETTLE).await;

            if self.processes.webhelper_running().await {
                tracing::error!("steamwebhelper survived pkill -9");
                return Err("Failed to terminate Steam processes.");
            }
        }

        tracing::info!("Steam processes terminated");
        Ok(())
    }

    async fn start(&self) -> bool {
        if self.platform == SteamPlatform::SteamDeck {
            return match self
                .processes
                .spawn("systemctl", &["--user", "restart", DECK_SERVICE], &EnvOverride::new())
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("systemctl restart failed: {e}");
                    false
                }
            };
        }

        match self.strategy {
            RestartStrategy::Simple => self.start_simple().await,
            RestartStrategy::Hardened => self.start_hardened().await,
        }
    }

    /// One plain launch with the inherited environment.
    async fn start_simple(&self) -> bool {
        let inherited = EnvOverride::new();
        let (program, args): (&str, &[&str]) = match self.platform {
            SteamPlatform::Flatpak => ("flatpak", &["run", FLATPAK_APP_ID][..]),
            _ => ("steam", &[][..]),
        };
        self.spawn_and_probe(program, args, &inherited, SPAWN_PROBE)
            .await
    }

    /// Cleaned environment and `-foreground`. Native installs fall back
    /// through `setsid` and `nohup`; Flatpak has no fallback.
    async fn start_hardened(&self) -> bool {
        let env = self
            .start_env
            .clone()
            .unwrap_or_else(EnvOverride::clean_for_steam_from_current);

        if self.platform == SteamPlatform::Flatpak {
            return self
                .spawn_and_probe(
                    "flatpak",
                    &["run", FLATPAK_APP_ID, "-silent"],
                    &env,
                    FLATPAK_SPAWN_PROBE,
                )
                .await;
        }

        let methods: [(&str, &[&str]); 3] = [
            ("steam", &["-foreground"][..]),
            ("setsid", &["steam", "-foreground"][..]),
            ("nohup", &["steam", "-foreground"][..]),
        ];
        for (program, args) in methods {
            if self.spawn_and_probe(program, args, &env, SPAWN_PROBE).await {
                return true;
            }
            tracing::warn!(method = program, "Steam not detected, trying next launch method");
        }
        false
    }

    async fn spawn_and_probe(
        &self,
        program: &str,
        args: &[&str],
        env: &EnvOverride,
        probe: Duration,
    ) -> bool {
        if let Err(e) = self.processes.spawn(program, args, env).await {
            tracing::error!(program, "failed to launch Steam: {e}");
            return false;
        }
        tracing::info!(program, ?args, "initiated Steam start");

        tokio::time::sleep(probe).await;
        let running = self.processes.steam_running().await;
        if running {
            tracing::info!(program, "Steam process detected");
        }
        running
    }

    /// Polls until Steam has been up for [`STABILIZE_WINDOW`] or
    /// [`START_TIMEOUT`] passes.
    async fn verify(&self) -> Result<(), &'static str> {
        let mut elapsed = Duration::ZERO;
        let mut first_seen: Option<Duration> = None;

        while elapsed < START_TIMEOUT {
            let running = self.processes.steam_running().await;
            match (running, first_seen) {
                (true, None) => {
                    tracing::info!(
                        elapsed_secs = elapsed.as_secs(),
                        "Steam process detected, waiting for it to settle"
                    );
                    first_seen = Some(elapsed);
                }
                (false, Some(_)) => {
                    tracing::warn!("Steam process disappeared during initialization");
                    return Err("Steam process disappeared during initialization.");
                }
                (false, None) => {
                    tracing::debug!(elapsed_secs = elapsed.as_secs(), "Steam not yet detected");
                }
                (true, Some(_)) => {}
            }

            tokio::time::sleep(POLL_INTERVAL).await;
            elapsed += POLL_INTERVAL;

            if let Some(seen) = first_seen
                && elapsed - seen >= STABILIZE_WINDOW
            {
                if self.processes.steam_running().await {
                    return Ok(());
                }
                tracing::warn!("Steam process disappeared during final initialization wait");
                return Err("Steam process disappeared during initialization.");
            }
        }

        tracing::error!("Steam failed to start within {}s", START_TIMEOUT.as_secs());
        Err("Steam did not start within timeout.")
    }

    async fn run_logged(&self, program: &str, args: &[&str]) {
        if let Err(e) = self.processes.run(program, args).await {
            tracing::debug!(program, ?args, "command failed: {e}");
        }
    }
}

#[cfg(target_os = "linux")]
impl Controller<crate::controller_linux::LinuxProcesses> {
    /// Controller for this machine: detected platform and the configured
    /// restart strategy.
    pub async fn detect() -> Self {
        let platform = crate::controller_linux::detect_platform().await;
        let strategy = crate::config::Settings::load().restart_strategy;
        Self::new(
            crate::controller_linux::LinuxProcesses::new(),
            platform,
            strategy,
        )
    }
}

struct Cycle<'a> {
    transitions: Vec<RestartState>,
    progress: &'a mut dyn FnMut(&str),
}

impl Cycle<'_> {
    fn enter(&mut self, state: RestartState, message: &str) {
        tracing::debug!(?state, "restart state");
        self.transitions.push(state);
        self.report(message);
    }

    fn report(&mut self, message: &str) {
        tracing::info!("{message}");
        let progress = &mut self.progress;
        if catch_unwind(AssertUnwindSafe(|| progress(message))).is_err() {
            tracing::warn!("progress callback panicked; continuing restart");
        }
    }

    fn fail(mut self, failure: RestartFailure, message: &str) -> RestartResult {
        self.report(message);
        self.transitions.push(RestartState::Failed);
        RestartResult {
            success: false,
            message: message.to_string(),
            failure: Some(failure),
            transitions: self.transitions,
        }
    }

    fn finish(self) -> RestartResult {
        RestartResult {
            success: true,
            message: "Steam restarted successfully".into(),
            failure: None,
            transitions: self.transitions,
        }
    }
}
