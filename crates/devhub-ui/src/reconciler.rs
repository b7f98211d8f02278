use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{ComponentStatus, DeviceInfo, LocalVersions, UpdateInfo, VersionFact};
use crate::progress::{ProgressSample, SubjectTag};
use crate::version::version_diff;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub tracked: ComponentStatus,
    pub app: ComponentStatus,
    pub tracked_diff: String,
    pub app_diff: String,
}

pub fn tracked_status(fact: &VersionFact, installed_code: u32) -> ComponentStatus {
    if !fact.is_observed() {
        ComponentStatus::NotInstalled
    } else if fact.code < installed_code {
        ComponentStatus::Obsolete
    } else {
        ComponentStatus::UpToDate
    }
}

pub fn app_status(
    fact: &VersionFact,
    channel_is_valid: bool,
    connectivity: bool,
    own_build_code: u32,
) -> ComponentStatus {
    if !channel_is_valid && connectivity {
        ComponentStatus::NotInstalled
    } else if fact.code > own_build_code {
        ComponentStatus::Obsolete
    } else {
        ComponentStatus::UpToDate
    }
}

/// Observable cells the UI binds to. Only the reconciler writes them.
pub struct StatusCells {
    tracked: watch::Sender<ComponentStatus>,
    app: watch::Sender<ComponentStatus>,
    tracked_text: watch::Sender<String>,
    app_text: watch::Sender<String>,
    tracked_diff: watch::Sender<String>,
    app_diff: watch::Sender<String>,
    tracked_progress: watch::Sender<u8>,
    app_progress: watch::Sender<u8>,
}

/// Read-only handles onto [`StatusCells`].
#[derive(Clone)]
pub struct StatusReaders {
    pub tracked: watch::Receiver<ComponentStatus>,
    pub app: watch::Receiver<ComponentStatus>,
    pub tracked_text: watch::Receiver<String>,
    pub app_text: watch::Receiver<String>,
    pub tracked_diff: watch::Receiver<String>,
    pub app_diff: watch::Receiver<String>,
    pub tracked_progress: watch::Receiver<u8>,
    pub app_progress: watch::Receiver<u8>,
}

impl StatusCells {
    fn new() -> Self {
        let loading = ComponentStatus::Loading;
        Self {
            tracked: watch::channel(loading).0,
            app: watch::channel(loading).0,
            tracked_text: watch::channel(loading.tracked_text().to_string()).0,
            app_text: watch::channel(loading.app_text().to_string()).0,
            tracked_diff: watch::channel(String::new()).0,
            app_diff: watch::channel(String::new()).0,
            tracked_progress: watch::channel(0).0,
            app_progress: watch::channel(0).0,
        }
    }

    pub fn subscribe(&self) -> StatusReaders {
        StatusReaders {
            tracked: self.tracked.subscribe(),
            app: self.app.subscribe(),
            tracked_text: self.tracked_text.subscribe(),
            app_text: self.app_text.subscribe(),
            tracked_diff: self.tracked_diff.subscribe(),
            app_diff: self.app_diff.subscribe(),
            tracked_progress: self.tracked_progress.subscribe(),
            app_progress: self.app_progress.subscribe(),
        }
    }

    pub fn snapshot(&self) -> ReconciliationResult {
        ReconciliationResult {
            tracked: *self.tracked.borrow(),
            app: *self.app.borrow(),
            tracked_diff: self.tracked_diff.borrow().clone(),
            app_diff: self.app_diff.borrow().clone(),
        }
    }

    pub fn tracked_progress(&self) -> u8 {
        *self.tracked_progress.borrow()
    }

    pub fn app_progress(&self) -> u8 {
        *self.app_progress.borrow()
    }

    fn write(&self, result: &ReconciliationResult) {
        set_if_changed(&self.tracked, result.tracked);
        set_if_changed(&self.app, result.app);
        set_if_changed(&self.tracked_text, result.tracked.tracked_text().to_string());
        set_if_changed(&self.app_text, result.app.app_text().to_string());
        set_if_changed(&self.tracked_diff, result.tracked_diff.clone());
        set_if_changed(&self.app_diff, result.app_diff.clone());
    }
}

fn set_if_changed<T: PartialEq>(cell: &watch::Sender<T>, value: T) {
    cell.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

/// Turns [`UpdateInfo`] into component statuses and owns the cells that
/// expose them.
pub struct UpdateReconciler {
    local: LocalVersions,
    device: DeviceInfo,
    cells: StatusCells,
    env_check_fired: bool,
}

impl UpdateReconciler {
    pub fn new(local: LocalVersions, device: DeviceInfo) -> Self {
        Self {
            local,
            device,
            cells: StatusCells::new(),
            env_check_fired: false,
        }
    }

    pub fn local(&self) -> &LocalVersions {
        &self.local
    }

    pub fn cells(&self) -> &StatusCells {
        &self.cells
    }

    /// Pure: derives statuses and diff strings without touching any cell.
    pub fn reconcile(&self, info: &UpdateInfo, connectivity: bool) -> ReconciliationResult {
        let tracked = tracked_status(&info.tracked, self.local.installed_code);
        let app = app_status(
            &info.app,
            info.channel_is_valid,
            connectivity,
            self.local.own_build_code,
        );

        let tracked_diff = if tracked == ComponentStatus::Obsolete {
            version_diff(&self.local.installed_label, &info.tracked.label)
        } else {
            String::new()
        };
        let app_diff = if app == ComponentStatus::Obsolete {
            version_diff(&self.local.own_build_label, &info.app.label)
        } else {
            String::new()
        };

        ReconciliationResult {
            tracked,
            app,
            tracked_diff,
            app_diff,
        }
    }

    /// Reconciles, publishes the result to the cells, and reports whether the
    /// one-time environment check is now due.
    pub fn apply(&mut self, info: &UpdateInfo, connectivity: bool) -> (ReconciliationResult, bool) {
        let result = self.reconcile(info, connectivity);
        self.cells.write(&result);
        debug!(
            tracked = %result.tracked,
            app = %result.app,
            "reconciled update info"
        );
        let env_check_due = self.take_env_check(result.tracked);
        (result, env_check_due)
    }

    /// Latches on the first status outside {not installed, loading}. Emulators
    /// never qualify.
    pub fn take_env_check(&mut self, tracked: ComponentStatus) -> bool {
        if self.env_check_fired
            || matches!(
                tracked,
                ComponentStatus::NotInstalled | ComponentStatus::Loading
            )
        {
            return false;
        }
        if self.device.is_emulator() {
            debug!("skipping environment check on emulator");
            return false;
        }
        self.env_check_fired = true;
        info!("environment check due");
        true
    }

    pub fn env_check_fired(&self) -> bool {
        self.env_check_fired
    }

    /// Routes a progress sample to its cell. Returns `false` for subjects
    /// the home screen does not show.
    pub fn apply_progress(&self, sample: ProgressSample) -> bool {
        let cell = match sample.subject {
            SubjectTag::TrackedDownload | SubjectTag::TrackedFlash => &self.cells.tracked_progress,
            SubjectTag::SelfDownload => &self.cells.app_progress,
            SubjectTag::ModuleDownload => return false,
        };
        set_if_changed(cell, sample.percent());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> LocalVersions {
        LocalVersions {
            installed_code: 25200,
            installed_label: "25.2".into(),
            own_build_code: 300,
            own_build_label: "8.0.3-a1b2".into(),
        }
    }

    fn info(tracked: u32, app: u32, channel_is_valid: bool) -> UpdateInfo {
        UpdateInfo {
            tracked: VersionFact::new(tracked, format!("{}", tracked as f32 / 1000.0)),
            app: VersionFact::new(app, "8.0.3-c3d4"),
            channel_is_valid,
        }
    }

    fn reconciler() -> UpdateReconciler {
        UpdateReconciler::new(local(), DeviceInfo::new("walleye", "walleye"))
    }

    #[test]
    fn tracked_code_below_installed_is_obsolete() {
        for installed in [2, 10, 25200] {
            for code in 1..installed.min(50) {
                assert_eq!(
                    tracked_status(&VersionFact::new(code, "x"), installed),
                    ComponentStatus::Obsolete
                );
            }
        }
    }

    #[test]
    fn unobserved_tracked_is_not_installed_regardless_of_installed_code() {
        for installed in [0, 1, 25200, u32::MAX] {
            assert_eq!(
                tracked_status(&VersionFact::default(), installed),
                ComponentStatus::NotInstalled
            );
        }
        assert_eq!(
            tracked_status(&VersionFact::new(25200, "25.2"), 25200),
            ComponentStatus::UpToDate
        );
    }

    #[test]
    fn invalid_channel_while_online_is_not_installed() {
        for (code, build) in [(0, 0), (500, 300), (1, 300), (300, 300)] {
            assert_eq!(
                app_status(&VersionFact::new(code, "x"), false, true, build),
                ComponentStatus::NotInstalled
            );
        }
    }

    #[test]
    fn invalid_channel_offline_falls_through_to_version_check() {
        assert_eq!(
            app_status(&VersionFact::new(301, "x"), false, false, 300),
            ComponentStatus::Obsolete
        );
        assert_eq!(
            app_status(&VersionFact::new(300, "x"), false, false, 300),
            ComponentStatus::UpToDate
        );
    }

    #[test]
    fn diff_strings_only_for_obsolete_components() {
        let rec = reconciler();
        let result = rec.reconcile(&info(25100, 301, true), true);
        assert_eq!(result.tracked, ComponentStatus::Obsolete);
        assert_eq!(result.tracked_diff, "25.2 → 25.1");
        assert_eq!(result.app, ComponentStatus::Obsolete);
        assert_eq!(result.app_diff, "a1b2 → c3d4");

        let result = rec.reconcile(&info(25200, 300, true), true);
        assert_eq!(result.tracked, ComponentStatus::UpToDate);
        assert_eq!(result.app, ComponentStatus::UpToDate);
        assert!(result.tracked_diff.is_empty());
        assert!(result.app_diff.is_empty());
    }

    #[test]
    fn cells_start_loading_and_follow_apply() {
        let mut rec = reconciler();
        let readers = rec.cells().subscribe();
        assert_eq!(*readers.tracked.borrow(), ComponentStatus::Loading);
        assert_eq!(*readers.app_text.borrow(), "Loading");

        rec.apply(&info(0, 300, false), true);
        assert_eq!(*readers.tracked.borrow(), ComponentStatus::NotInstalled);
        assert_eq!(*readers.tracked_text.borrow(), "Not installed");
        assert_eq!(*readers.app.borrow(), ComponentStatus::NotInstalled);
        assert_eq!(*readers.app_text.borrow(), "Update channel error");
    }

    #[test]
    fn env_check_fires_once_across_transitions() {
        let mut rec = reconciler();
        let mut fired = 0;
        for tracked in [0, 25200, 25100, 25200, 0, 25300] {
            let (_, due) = rec.apply(&info(tracked, 300, true), true);
            if due {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(rec.env_check_fired());
    }

    #[test]
    fn env_check_first_fires_on_first_qualifying_status() {
        let mut rec = reconciler();
        assert!(!rec.apply(&info(0, 300, true), true).1);
        assert!(rec.apply(&info(25200, 300, true), true).1);
        assert!(!rec.apply(&info(25100, 300, true), true).1);
    }

    #[test]
    fn emulators_never_run_env_check() {
        let mut rec = UpdateReconciler::new(local(), DeviceInfo::new("generic_x86", "sdk"));
        assert!(!rec.apply(&info(25200, 300, true), true).1);
        assert!(!rec.env_check_fired());
    }

    #[test]
    fn progress_updates_only_matching_cell() {
        let rec = reconciler();
        assert!(rec.apply_progress(ProgressSample::new(0.42, SubjectTag::SelfDownload)));
        assert_eq!(rec.cells().app_progress(), 42);
        assert_eq!(rec.cells().tracked_progress(), 0);

        assert!(rec.apply_progress(ProgressSample::new(0.7, SubjectTag::TrackedFlash)));
        assert_eq!(rec.cells().tracked_progress(), 70);

        assert!(!rec.apply_progress(ProgressSample::new(0.9, SubjectTag::ModuleDownload)));
        assert_eq!(rec.cells().tracked_progress(), 70);
        assert_eq!(rec.cells().app_progress(), 42);
    }
}
