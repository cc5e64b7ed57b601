use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_types::{is_translated, parse_context, screenshot_name, RemoteUnitId, ScreenshotId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use project_settings::ProjectSettings;
use tracing::{debug, error, info, warn};
use weblate::{RemoteScreenshot, RemoteUnit, WeblateClient};

use crate::tree::ProjectTree;
use crate::{EngineError, Result};

pub type RemoteIter<'a, T> = Box<dyn Iterator<Item = weblate::Result<T>> + 'a>;

/// Remote operations the orchestrator needs. Implemented by [`WeblateClient`].
pub trait RemoteService {
    fn list_screenshots<'a>(
        &'a self,
        project: &str,
        component: &str,
    ) -> weblate::Result<RemoteIter<'a, RemoteScreenshot>>;

    fn list_units<'a>(
        &'a self,
        project: &str,
        component: &str,
        language: &str,
    ) -> weblate::Result<RemoteIter<'a, RemoteUnit>>;

    fn upload_screenshot(
        &self,
        file: &Path,
        name: &str,
        project: &str,
        component: &str,
        language: &str,
    ) -> weblate::Result<RemoteScreenshot>;

    fn link_unit(&self, screenshot: ScreenshotId, unit: RemoteUnitId) -> weblate::Result<()>;
}

impl RemoteService for WeblateClient {
    fn list_screenshots<'a>(
        &'a self,
        project: &str,
        component: &str,
    ) -> weblate::Result<RemoteIter<'a, RemoteScreenshot>> {
        Ok(Box::new(WeblateClient::list_screenshots(
            self, project, component,
        )?))
    }

    fn list_units<'a>(
        &'a self,
        project: &str,
        component: &str,
        language: &str,
    ) -> weblate::Result<RemoteIter<'a, RemoteUnit>> {
        Ok(Box::new(WeblateClient::list_units(
            self, project, component, language,
        )?))
    }

    fn upload_screenshot(
        &self,
        file: &Path,
        name: &str,
        project: &str,
        component: &str,
        language: &str,
    ) -> weblate::Result<RemoteScreenshot> {
        WeblateClient::upload_screenshot(self, file, name, project, component, language)
    }

    fn link_unit(&self, screenshot: ScreenshotId, unit: RemoteUnitId) -> weblate::Result<()> {
        WeblateClient::link_unit(self, screenshot, unit)
    }
}

#[derive(Clone, Default, Debug)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPlan {
    pub unit_name: String,
    pub component: String,
    /// Unit root below the image folder; remote contexts are relative to it.
    pub root: String,
    /// Images the tree builder assigned to this unit. Only these are uploaded.
    pub images: BTreeSet<String>,
}

impl ComponentPlan {
    fn image_path(&self, relative: &str) -> String {
        if self.root.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.root)
        }
    }
}

/// Everything a sync run needs, detached from the open project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub project_slug: String,
    pub language: String,
    pub image_folder: PathBuf,
    pub components: Vec<ComponentPlan>,
}

impl SyncPlan {
    pub fn from_project(settings: &ProjectSettings, tree: &ProjectTree) -> Self {
        Self {
            project_slug: settings.weblate_project_slug.clone(),
            language: settings.language.clone(),
            image_folder: tree.image_folder.clone(),
            components: tree
                .units
                .iter()
                .map(|unit| ComponentPlan {
                    unit_name: unit.name.clone(),
                    component: unit.component.clone(),
                    root: unit.root.clone(),
                    images: unit.images.iter().map(|leaf| leaf.path.clone()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub linked: usize,
    pub skipped: usize,
}

/// Upload missing screenshots and link them to their remote units, one component at a time.
///
/// The first remote failure ends the run. Work done before it stays on the server,
/// and a later run picks up where this one stopped.
pub fn run_sync<R>(
    remote: &R,
    plan: &SyncPlan,
    cancel: &CancellationFlag,
    status: &mut dyn FnMut(String),
) -> Result<SyncReport>
where
    R: RemoteService + ?Sized,
{
    let mut report = SyncReport::default();

    for component in &plan.components {
        check_cancel(cancel)?;
        status(format!(
            "Fetching screenshots of {}/{}",
            plan.project_slug, component.component
        ));
        let mut screenshots: HashMap<String, RemoteScreenshot> = HashMap::new();
        for screenshot in remote.list_screenshots(&plan.project_slug, &component.component)? {
            let screenshot = screenshot?;
            match screenshots.get_mut(&screenshot.name) {
                Some(kept) => {
                    // Links on any same-named copy count as already done.
                    warn!(
                        name = %screenshot.name,
                        kept = %kept.id,
                        duplicate = %screenshot.id,
                        "duplicate remote screenshot name"
                    );
                    kept.linked_unit_ids.extend(screenshot.linked_unit_ids);
                }
                None => {
                    screenshots.insert(screenshot.name.clone(), screenshot);
                }
            }
        }
        status(format!(
            "Found {} screenshots, fetching units of {}",
            screenshots.len(),
            component.component
        ));

        let units = remote.list_units(&plan.project_slug, &component.component, &plan.language)?;
        for unit in units {
            let unit = unit?;
            check_cancel(cancel)?;

            let Some(relative) = parse_context(&unit.context) else {
                report.skipped += 1;
                status(format!("Skipping unit {}: no image in context", unit.id));
                continue;
            };
            if !is_translated(&unit.source) {
                report.skipped += 1;
                status(format!("Skipping unit {}: {relative} has no text yet", unit.id));
                continue;
            }

            let image_path = component.image_path(relative);
            if !component.images.contains(&image_path) {
                report.skipped += 1;
                warn!(
                    context = %unit.context,
                    unit = %component.unit_name,
                    "remote context names no local image of this unit"
                );
                status(format!(
                    "Skipping unit {}: {image_path} is not an image of unit {}",
                    unit.id, component.unit_name
                ));
                continue;
            }
            let name = screenshot_name(&image_path);
            if !screenshots.contains_key(&name) {
                let file = plan.image_folder.join(&image_path);
                if !file.is_file() {
                    report.skipped += 1;
                    warn!(file = %file.display(), "image referenced by remote unit is missing");
                    status(format!("Skipping unit {}: {image_path} not found locally", unit.id));
                    continue;
                }
                status(format!("Uploading {image_path} as {name}"));
                let created = remote.upload_screenshot(
                    &file,
                    &name,
                    &plan.project_slug,
                    &component.component,
                    &plan.language,
                )?;
                report.uploaded += 1;
                status(format!("Uploaded {name} (screenshot {})", created.id));
                screenshots.insert(name.clone(), created);
                check_cancel(cancel)?;
            }

            let Some(screenshot) = screenshots.get_mut(&name) else {
                continue;
            };
            if screenshot.is_linked_to(unit.source_unit_id) {
                debug!(%name, unit = %unit.source_unit_id, "already linked");
                continue;
            }
            status(format!(
                "Linking unit {} to screenshot {}",
                unit.source_unit_id, screenshot.id
            ));
            remote.link_unit(screenshot.id, unit.source_unit_id)?;
            screenshot.linked_unit_ids.insert(unit.source_unit_id);
            report.linked += 1;
        }
        info!(component = %component.component, ?report, "component synced");
    }

    status(format!(
        "Done: {} uploaded, {} linked, {} skipped",
        report.uploaded, report.linked, report.skipped
    ));
    Ok(report)
}

fn check_cancel(cancel: &CancellationFlag) -> Result<()> {
    if cancel.is_canceled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Status(String),
    Finished(SyncReport),
    Failed(String),
    Cancelled,
}

impl SyncEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncEvent::Status(_))
    }
}

/// Background sync run.
pub struct SyncTask;

impl SyncTask {
    /// Run [`run_sync`] on its own thread. Progress arrives on the returned
    /// handle's channel, followed by exactly one terminal event.
    pub fn spawn<R>(remote: R, plan: SyncPlan) -> Result<SyncHandle>
    where
        R: RemoteService + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let cancel = CancellationFlag::default();
        let worker_cancel = cancel.clone();

        let thread = thread::Builder::new()
            .name("imapo-sync".into())
            .spawn(move || {
                let mut forward = |message: String| send(&tx, SyncEvent::Status(message));
                let terminal = match run_sync(&remote, &plan, &worker_cancel, &mut forward) {
                    Ok(report) => SyncEvent::Finished(report),
                    Err(EngineError::Cancelled) => {
                        info!("sync cancelled");
                        SyncEvent::Cancelled
                    }
                    Err(err) => {
                        error!(error = %err, "sync failed");
                        SyncEvent::Failed(err.to_string())
                    }
                };
                send(&tx, terminal);
            })?;

        Ok(SyncHandle {
            events: rx,
            cancel,
            thread: Some(thread),
        })
    }
}

fn send(tx: &Sender<SyncEvent>, event: SyncEvent) {
    // A dropped receiver only means nobody is watching any more.
    if tx.send(event).is_err() {
        debug!("sync event receiver dropped");
    }
}

pub struct SyncHandle {
    events: Receiver<SyncEvent>,
    cancel: CancellationFlag,
    thread: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn events(&self) -> &Receiver<SyncEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread to exit.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("sync thread panicked");
            }
        }
    }
}
