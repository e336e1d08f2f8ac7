//! Restore pipeline: snapshot directory -> running workload.
//!
//! Every check that can reject a snapshot runs before the engine is asked to
//! change anything. Translation (including bind-source checks) and the name
//! collision check come first, then the image load, volume replay and launch.
//! Engine mutations are recorded in a [`RestoreJournal`] that is logged when a
//! restore aborts.

use crate::launcher::ContainerLauncher;
use crate::preflight::{ImageAction, PreflightValidator};
use crate::settings::Settings;
use crate::translate::translate;
use crate::volumes::VolumeRestorer;
use boxkeep_common::{
    BoxkeepError, ConfigModel, ContainerEngine, LaunchSpec, Result, SnapshotLayout,
    VolumeSnapshot,
};
use boxkeep_engine::archive::image_repo_tag;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    ValidateInputs,
    TranslateConfig,
    CheckNameCollision,
    LoadOrSkipImage,
    RestoreVolumes,
    Launch,
    Done,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RestoreStage::ValidateInputs => "validate-inputs",
            RestoreStage::TranslateConfig => "translate-config",
            RestoreStage::CheckNameCollision => "check-name-collision",
            RestoreStage::LoadOrSkipImage => "load-or-skip-image",
            RestoreStage::RestoreVolumes => "restore-volumes",
            RestoreStage::Launch => "launch",
            RestoreStage::Done => "done",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    ImageLoaded(String),
    ImageReused(String),
    VolumeCreated(String),
    VolumeReused(String),
    VolumeReplayed(String),
    ContainerLaunched { name: String, id: String },
}

impl JournalEntry {
    /// Whether the step changed engine state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            JournalEntry::ImageReused(_) | JournalEntry::VolumeReused(_)
        )
    }
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalEntry::ImageLoaded(image) => write!(f, "loaded image {image}"),
            JournalEntry::ImageReused(image) => write!(f, "reused image {image}"),
            JournalEntry::VolumeCreated(volume) => write!(f, "created volume {volume}"),
            JournalEntry::VolumeReused(volume) => write!(f, "reused volume {volume}"),
            JournalEntry::VolumeReplayed(volume) => {
                write!(f, "extracted archive into volume {volume}")
            }
            JournalEntry::ContainerLaunched { name, id } => {
                write!(f, "launched workload {name} ({id})")
            }
        }
    }
}

/// Ordered record of the steps a restore took against the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreJournal {
    entries: Vec<JournalEntry>,
}

impl RestoreJournal {
    pub fn record(&mut self, entry: JournalEntry) {
        info!(step = %entry, "Restore step");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn mutations(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(|e| e.is_mutation())
    }
}

/// What restoring a snapshot directory would do, worked out without asking
/// the engine anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    pub layout: SnapshotLayout,
    /// Tag recorded in the image archive's manifest.
    pub image_ref: String,
    pub spec: LaunchSpec,
    pub volumes: Vec<VolumeSnapshot>,
}

impl RestorePlan {
    /// Validates the snapshot directory and translates its configuration.
    /// Bind-mount sources are checked against this host.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let inputs = SnapshotInputs::read(SnapshotLayout::new(dir))?;
        let spec = translate(&inputs.model, &inputs.image_ref)?;
        Ok(Self {
            layout: inputs.layout,
            image_ref: inputs.image_ref,
            spec,
            volumes: inputs.volumes,
        })
    }
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub container_id: String,
    pub spec: LaunchSpec,
    pub journal: RestoreJournal,
}

/// Everything read from a snapshot directory before translation.
struct SnapshotInputs {
    layout: SnapshotLayout,
    image_ref: String,
    model: ConfigModel,
    volumes: Vec<VolumeSnapshot>,
}

impl SnapshotInputs {
    fn read(layout: SnapshotLayout) -> Result<Self> {
        layout.validate()?;
        let image_ref = image_repo_tag(&layout.image_archive())?;
        let model = ConfigModel::from_slice(&std::fs::read(layout.config_document())?)?;
        let volumes = layout.volume_snapshots()?;
        Ok(Self {
            layout,
            image_ref,
            model,
            volumes,
        })
    }
}

#[derive(Default)]
struct RestoreRun {
    stage: Option<RestoreStage>,
    journal: RestoreJournal,
}

impl RestoreRun {
    fn enter(&mut self, stage: RestoreStage) {
        info!(%stage, "Restore stage");
        self.stage = Some(stage);
    }

    fn abort(&self, err: &BoxkeepError) {
        let stage = self.stage.unwrap_or(RestoreStage::ValidateInputs);
        error!(%stage, error = %err, "Restore aborted");
        let mutations: Vec<_> = self.journal.mutations().collect();
        if mutations.is_empty() {
            info!("No engine state was changed");
            return;
        }
        for entry in mutations {
            warn!(step = %entry, "Left in place by aborted restore");
        }
    }
}

/// Drives a restore against one engine.
pub struct RestoreManager {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
}

impl RestoreManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: Settings) -> Self {
        Self { engine, settings }
    }

    /// Restores the snapshot at `dir` and returns the new workload's id.
    ///
    /// A failed restore can be re-run: an image or volume left behind by the
    /// earlier attempt is reused rather than recreated.
    pub async fn restore(&self, dir: &Path) -> Result<RestoreOutcome> {
        let mut run = RestoreRun::default();
        match self.execute(dir, &mut run).await {
            Ok((container_id, spec)) => Ok(RestoreOutcome {
                container_id,
                spec,
                journal: run.journal,
            }),
            Err(err) => {
                run.abort(&err);
                Err(err)
            }
        }
    }

    async fn execute(&self, dir: &Path, run: &mut RestoreRun) -> Result<(String, LaunchSpec)> {
        run.enter(RestoreStage::ValidateInputs);
        self.engine.ping().await?;
        let layout = SnapshotLayout::new(dir);
        let inputs = tokio::task::spawn_blocking(move || SnapshotInputs::read(layout))
            .await
            .map_err(|e| BoxkeepError::ArchiveFailure(format!("snapshot reader failed: {e}")))??;
        info!(
            snapshot = %inputs.layout.root().display(),
            image = %inputs.image_ref,
            volumes = inputs.volumes.len(),
            "Snapshot validated"
        );

        run.enter(RestoreStage::TranslateConfig);
        let spec = translate(&inputs.model, &inputs.image_ref)?;

        run.enter(RestoreStage::CheckNameCollision);
        let preflight = PreflightValidator::new(self.engine.clone());
        preflight.check_name(&spec.name).await?;

        run.enter(RestoreStage::LoadOrSkipImage);
        match preflight.plan_image(&inputs.image_ref).await? {
            ImageAction::Reuse => {
                run.journal
                    .record(JournalEntry::ImageReused(inputs.image_ref.clone()));
            }
            ImageAction::Load => {
                self.engine.load_image(&inputs.layout.image_archive()).await?;
                if !self.engine.image_exists(&inputs.image_ref).await? {
                    return Err(BoxkeepError::ArchiveFailure(format!(
                        "image archive {} did not provide {}",
                        inputs.layout.image_archive().display(),
                        inputs.image_ref
                    )));
                }
                run.journal
                    .record(JournalEntry::ImageLoaded(inputs.image_ref.clone()));
            }
        }

        run.enter(RestoreStage::RestoreVolumes);
        let plans = preflight.plan_volumes(inputs.volumes).await?;
        VolumeRestorer::new(self.engine.clone(), self.settings.helper_image.as_str())
            .restore_all(&plans, &inputs.layout, &mut run.journal)
            .await?;

        run.enter(RestoreStage::Launch);
        let container_id = ContainerLauncher::new(self.engine.clone())
            .launch(&spec)
            .await?;
        run.journal.record(JournalEntry::ContainerLaunched {
            name: spec.name.clone(),
            id: container_id.clone(),
        });

        run.enter(RestoreStage::Done);
        Ok((container_id, spec))
    }
}
