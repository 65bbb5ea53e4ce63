//! End-to-end shortcut setup: create the shortcut, map it to a Proton
//! build and report where its prefix lives.

use std::path::PathBuf;

use crate::SteamError;
use crate::compat_tool::{CompatToolMapper, TextSpliceMapper};
use crate::config::Settings;
use crate::controller::{Controller, RestartResult, SteamProcesses};
use crate::paths::Paths;
use crate::prefix;
use crate::shortcuts::{NewShortcut, Shortcut, ShortcutStore};
use crate::users;

/// What the caller wants set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutRequest {
    pub name: String,
    pub exe: PathBuf,
    pub start_dir: Option<PathBuf>,
    pub launch_options: String,
    pub tags: Vec<String>,
    /// Proton build; the configured default when `None`.
    pub proton: Option<String>,
    /// Swap out shortcuts with the same name instead of reporting a
    /// conflict. Removal and insert land in one write, so a failed create
    /// keeps the old entries.
    pub replace_existing: bool,
}

impl ShortcutRequest {
    pub fn new(name: impl Into<String>, exe: impl Into<PathBuf>) -> Self {
        let base = NewShortcut::new(name, exe);
        Self {
            name: base.name,
            exe: base.exe,
            start_dir: base.start_dir,
            launch_options: base.launch_options,
            tags: base.tags,
            proton: None,
            replace_existing: false,
        }
    }

    pub fn with_proton(mut self, proton: impl Into<String>) -> Self {
        self.proton = Some(proton.into());
        self
    }

    pub fn with_launch_options(mut self, options: impl Into<String>) -> Self {
        self.launch_options = options.into();
        self
    }

    pub fn replacing_existing(mut self) -> Self {
        self.replace_existing = true;
        self
    }

    fn to_new_shortcut(&self) -> NewShortcut {
        NewShortcut {
            name: self.name.clone(),
            exe: self.exe.clone(),
            start_dir: self.start_dir.clone(),
            launch_options: self.launch_options.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Outcome of [`SteamSetup::create_shortcut_with_proton`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Success {
        /// Unsigned form, as used by `config.vdf` and `compatdata/`.
        app_id: u32,
        signed_app_id: i32,
        /// `None` until Steam has launched the shortcut once.
        prefix_path: Option<PathBuf>,
    },
    /// Shortcuts with the requested name already exist.
    Conflict { existing: Vec<Shortcut> },
    /// `app_id` is set when the shortcut was written but a later step
    /// failed.
    Failure { reason: String, app_id: Option<u32> },
}

impl SetupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SetupOutcome::Success { .. })
    }

    pub fn app_id(&self) -> Option<u32> {
        match self {
            SetupOutcome::Success { app_id, .. } => Some(*app_id),
            SetupOutcome::Failure { app_id, .. } => *app_id,
            SetupOutcome::Conflict { .. } => None,
        }
    }
}

/// Shortcut store, compat tool mapper and prefix lookup for one Steam user.
pub struct SteamSetup {
    paths: Paths,
    store: ShortcutStore,
    mapper: Box<dyn CompatToolMapper + Send>,
    settings: Settings,
    library_candidates: Option<Vec<PathBuf>>,
}

impl SteamSetup {
    /// Resolves the installation and active user afresh.
    pub fn for_active_user() -> Result<Self, SteamError> {
        let (paths, user) = users::resolve_active_user()?;
        let mapper = TextSpliceMapper::for_paths(&paths);
        Ok(Self {
            store: ShortcutStore::for_user(&user),
            mapper: Box::new(mapper),
            settings: Settings::load(),
            library_candidates: None,
            paths,
        })
    }

    /// Setup rooted at `paths` only; prefixes are looked up under that
    /// root and the libraries it registers.
    pub fn new(
        paths: Paths,
        store: ShortcutStore,
        mapper: impl CompatToolMapper + Send + 'static,
    ) -> Self {
        let library_candidates = Some(vec![paths.base_dir().to_path_buf()]);
        Self {
            paths,
            store,
            mapper: Box::new(mapper),
            settings: Settings::default(),
            library_candidates,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn store(&self) -> &ShortcutStore {
        &self.store
    }

    /// Creates the shortcut and maps it to the requested Proton build.
    pub fn create_shortcut_with_proton(&mut self, request: &ShortcutRequest) -> SetupOutcome {
        let proton = request
            .proton
            .clone()
            .unwrap_or_else(|| self.settings.proton_or_default().to_string());
        tracing::info!(name = %request.name, %proton, "creating shortcut with Proton");

        let existing = match self.store.shortcuts() {
            Ok(all) => all
                .into_iter()
                .filter(|s| s.app_name.trim().eq_ignore_ascii_case(request.name.trim()))
                .collect::<Vec<_>>(),
            Err(e) => return failure(format!("failed to read shortcuts: {e}"), None),
        };

        if !existing.is_empty() && !request.replace_existing {
            tracing::warn!(name = %request.name, count = existing.len(), "shortcut already exists");
            return SetupOutcome::Conflict { existing };
        }

        let new_shortcut = request.to_new_shortcut();
        let written = if existing.is_empty() {
            self.store.create_shortcut(&new_shortcut)
        } else {
            self.store.replace_shortcut(&new_shortcut)
        };
        let created = match written {
            Ok(created) => created,
            Err(e) => return failure(format!("failed to create shortcut: {e}"), None),
        };
        let app_id = created.unsigned_app_id();

        if let Err(e) = self.mapper.set_compat_tool(app_id, &proton) {
            tracing::error!(app_id, "shortcut created but Proton mapping failed: {e}");
            return failure(format!("failed to set Proton version: {e}"), Some(app_id));
        }

        SetupOutcome::Success {
            app_id,
            signed_app_id: created.app_id,
            prefix_path: self.find_compatdata(app_id),
        }
    }

    /// Current compatdata directory for `app_id`.
    pub fn find_compatdata(&self, app_id: u32) -> Option<PathBuf> {
        match &self.library_candidates {
            Some(candidates) => {
                prefix::find_compatdata_in(&prefix::library_roots_from(candidates), app_id)
            }
            None => prefix::find_compatdata(app_id),
        }
    }

    /// Restarts Steam, putting `shortcuts.vdf` back if Steam wiped it on
    /// the way down or up.
    pub async fn restart_steam<P: SteamProcesses>(
        &self,
        controller: &Controller<P>,
        progress: &mut dyn FnMut(&str),
    ) -> RestartResult {
        let snapshot = self.take_snapshot();
        let result = controller.restart(progress).await;
        self.restore_snapshot(snapshot.as_deref());
        result
    }

    /// Blocking form of [`SteamSetup::restart_steam`].
    pub fn restart_steam_blocking<P: SteamProcesses>(
        &self,
        controller: &Controller<P>,
        progress: &mut dyn FnMut(&str),
    ) -> RestartResult {
        let snapshot = self.take_snapshot();
        let result = controller.restart_blocking(progress);
        self.restore_snapshot(snapshot.as_deref());
        result
    }

    fn take_snapshot(&self) -> Option<Vec<u8>> {
        match self.store.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("could not snapshot shortcuts before restart: {e}");
                None
            }
        }
    }

    fn restore_snapshot(&self, snapshot: Option<&[u8]>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        match self.store.restore_if_damaged(snapshot) {
            Ok(true) => tracing::warn!("restored shortcuts.vdf after restart"),
            Ok(false) => {}
            Err(e) => tracing::error!("failed to restore shortcuts.vdf: {e}"),
        }
    }
}

fn failure(reason: String, app_id: Option<u32>) -> SetupOutcome {
    tracing::error!(%reason, "shortcut setup failed");
    SetupOutcome::Failure { reason, app_id }
}
