use std::path::Path;

use crossbeam_channel::Receiver;
use project_settings::ProjectSettings;
use tracing::{info, warn};
use weblate::WeblateClient;

use crate::segments::{ImageStatus, SegmentManager};
use crate::sync::{RemoteService, SyncEvent, SyncHandle, SyncPlan, SyncTask};
use crate::tree::build_tree;
use crate::{EngineError, Result};

/// What a frontend shows for the selected image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentView {
    pub context: String,
    pub text: String,
}

struct OpenProject {
    settings: ProjectSettings,
    segments: SegmentManager,
}

/// Command surface for a frontend: one open project and at most one running sync.
///
/// Calls are expected from a single thread. The sync runs elsewhere and only
/// talks back through its event channel.
#[derive(Default)]
pub struct ProjectSession {
    project: Option<OpenProject>,
    sync: Option<SyncHandle>,
}

impl ProjectSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a project file and build its tree. Any previously open project is flushed first.
    pub fn open_project(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_sync_running() {
            return Err(EngineError::SyncInProgress);
        }
        let path = path.as_ref();
        let settings = ProjectSettings::load(path)?;
        if let Some(previous) = &self.project {
            previous.segments.flush()?;
        }
        let segments = SegmentManager::new(build_tree(&settings)?);
        info!(path = %path.display(), project = %settings.name, "project opened");
        self.project = Some(OpenProject { settings, segments });
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.project.is_some()
    }

    pub fn settings(&self) -> Result<&ProjectSettings> {
        Ok(&self.open()?.settings)
    }

    pub fn segments(&self) -> Result<&SegmentManager> {
        Ok(&self.open()?.segments)
    }

    pub fn get_or_create_segment(&mut self, image: &str) -> Result<SegmentView> {
        let segment = self.open_mut()?.segments.get_or_create_segment(image)?;
        Ok(SegmentView {
            context: segment.context,
            text: segment.source,
        })
    }

    pub fn set_segment_text(&mut self, image: &str, text: &str) -> Result<()> {
        self.open_mut()?.segments.set_text(image, text)?;
        Ok(())
    }

    pub fn has_translation(&self, image: &str) -> Result<bool> {
        Ok(self.open()?.segments.has_translation(image))
    }

    pub fn images(&self) -> Result<Vec<ImageStatus>> {
        Ok(self.open()?.segments.images())
    }

    pub fn next_image(&self, image: &str) -> Result<Option<String>> {
        self.open()?.segments.next_image(image)
    }

    /// Start a sync against the project's Weblate server.
    pub fn start_sync(&mut self, token: &str) -> Result<Receiver<SyncEvent>> {
        let url = self.settings()?.weblate_url.clone();
        if url.trim().is_empty() {
            return Err(EngineError::Configuration(
                "weblateUrl is not set in the project file".to_string(),
            ));
        }
        let mut client = WeblateClient::new(&url)
            .map_err(|err| EngineError::Configuration(err.to_string()))?;
        client.set_token(token);
        self.start_sync_with(client)
    }

    /// Start a sync against any remote service implementation.
    pub fn start_sync_with<R>(&mut self, remote: R) -> Result<Receiver<SyncEvent>>
    where
        R: RemoteService + Send + 'static,
    {
        if self.is_sync_running() {
            return Err(EngineError::SyncInProgress);
        }
        let project = self.open()?;
        let plan = SyncPlan::from_project(&project.settings, project.segments.tree());
        let handle = SyncTask::spawn(remote, plan)?;
        let events = handle.events().clone();
        if let Some(finished) = self.sync.replace(handle) {
            finished.join();
        }
        info!("sync started");
        Ok(events)
    }

    pub fn is_sync_running(&self) -> bool {
        self.sync.as_ref().is_some_and(|sync| !sync.is_finished())
    }

    pub fn cancel_sync(&self) {
        if let Some(sync) = &self.sync {
            sync.cancel();
        }
    }

    /// Flush every catalog and drop the project. A running sync is asked to stop.
    pub fn close(&mut self) -> Result<()> {
        if let Some(sync) = self.sync.take() {
            if !sync.is_finished() {
                warn!("closing project while a sync is running, cancelling it");
                sync.cancel();
            }
        }
        if let Some(project) = self.project.take() {
            project.segments.flush()?;
            info!(project = %project.settings.name, "project closed");
        }
        Ok(())
    }

    fn open(&self) -> Result<&OpenProject> {
        self.project.as_ref().ok_or(EngineError::NoProject)
    }

    fn open_mut(&mut self) -> Result<&mut OpenProject> {
        self.project.as_mut().ok_or(EngineError::NoProject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RemoteIter;
    use crate::test_support::write_project;
    use core_types::{RemoteUnitId, ScreenshotId};
    use crossbeam_channel::{bounded, Receiver as GateReceiver};
    use std::collections::BTreeSet;
    use tempfile::tempdir;
    use weblate::{RemoteScreenshot, RemoteUnit};

    const UI_UNIT: &str = "units:\n  - name: ui\n    imageGlobPattern: \"screens/**/*.png\"\n";

    /// Remote whose unit listing blocks until the test opens the gate.
    struct GatedRemote {
        gate: GateReceiver<()>,
    }

    impl RemoteService for GatedRemote {
        fn list_screenshots<'a>(
            &'a self,
            _project: &str,
            _component: &str,
        ) -> weblate::Result<RemoteIter<'a, RemoteScreenshot>> {
            let _ = self.gate.recv();
            Ok(Box::new(std::iter::empty()))
        }

        fn list_units<'a>(
            &'a self,
            _project: &str,
            _component: &str,
            _language: &str,
        ) -> weblate::Result<RemoteIter<'a, RemoteUnit>> {
            Ok(Box::new(std::iter::empty()))
        }

        fn upload_screenshot(
            &self,
            _file: &Path,
            name: &str,
            _project: &str,
            _component: &str,
            _language: &str,
        ) -> weblate::Result<RemoteScreenshot> {
            Ok(RemoteScreenshot {
                id: ScreenshotId(1),
                name: name.to_string(),
                linked_unit_ids: BTreeSet::new(),
            })
        }

        fn link_unit(&self, _screenshot: ScreenshotId, _unit: RemoteUnitId) -> weblate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn commands_fail_without_a_project() {
        let mut session = ProjectSession::new();
        assert!(matches!(
            session.get_or_create_segment("screens/a.png"),
            Err(EngineError::NoProject)
        ));
        assert!(matches!(session.start_sync("t"), Err(EngineError::NoProject)));
        assert!(session.close().is_ok());
    }

    #[test]
    fn edits_round_trip_through_the_session() {
        let dir = tempdir().unwrap();
        let file = write_project(dir.path(), UI_UNIT, &["screens/a.png", "screens/b.png"]);
        let mut session = ProjectSession::new();
        session.open_project(&file).unwrap();

        let view = session.get_or_create_segment("screens/a.png").unwrap();
        assert_eq!(
            view,
            SegmentView {
                context: "image=a.png".into(),
                text: "TODO".into()
            }
        );
        session.set_segment_text("screens/a.png", "Hello").unwrap();
        assert!(session.has_translation("screens/a.png").unwrap());
        assert_eq!(
            session.next_image("screens/a.png").unwrap().as_deref(),
            Some("screens/b.png")
        );
        session.close().unwrap();
        assert!(!session.is_open());

        session.open_project(&file).unwrap();
        assert_eq!(
            session.get_or_create_segment("screens/a.png").unwrap().text,
            "Hello"
        );
    }

    #[test]
    fn opening_a_broken_project_keeps_the_current_one() {
        let dir = tempdir().unwrap();
        let file = write_project(dir.path(), UI_UNIT, &["screens/a.png"]);
        let mut session = ProjectSession::new();
        session.open_project(&file).unwrap();

        let missing = dir.path().join("nope.yml");
        assert!(matches!(
            session.open_project(&missing),
            Err(EngineError::Configuration(_))
        ));
        assert!(session.is_open());
    }

    #[test]
    fn open_and_second_sync_are_rejected_while_syncing() {
        let dir = tempdir().unwrap();
        let file = write_project(dir.path(), UI_UNIT, &["screens/a.png"]);
        let mut session = ProjectSession::new();
        session.open_project(&file).unwrap();

        let (open_gate, gate) = bounded(1);
        let events = session.start_sync_with(GatedRemote { gate: gate.clone() }).unwrap();
        assert!(session.is_sync_running());
        assert!(matches!(
            session.open_project(&file),
            Err(EngineError::SyncInProgress)
        ));
        assert!(matches!(
            session.start_sync_with(GatedRemote { gate }),
            Err(EngineError::SyncInProgress)
        ));

        open_gate.send(()).unwrap();
        let last = events.iter().find(SyncEvent::is_terminal);
        assert!(matches!(last, Some(SyncEvent::Finished(_))));
        while session.is_sync_running() {
            std::thread::yield_now();
        }
        session.open_project(&file).unwrap();
    }

    #[test]
    fn start_sync_requires_a_server_url() {
        let dir = tempdir().unwrap();
        let file = write_project(dir.path(), UI_UNIT, &[]);
        let text = std::fs::read_to_string(&file)
            .unwrap()
            .replace("weblateUrl: https://weblate.example.com/", "weblateUrl: \"\"");
        std::fs::write(&file, text).unwrap();

        let mut session = ProjectSession::new();
        session.open_project(&file).unwrap();
        assert!(matches!(
            session.start_sync("token"),
            Err(EngineError::Configuration(msg)) if msg.contains("weblateUrl")
        ));
    }
}
