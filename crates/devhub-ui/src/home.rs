use std::sync::Arc;

use devhub_telemetry as telemetry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::commands::{CommandEvent, Destination, DialogKind, STORAGE_PERMISSION};
use crate::config::ConfigStore;
use crate::env_check::EnvCheck;
use crate::error::UiError;
use crate::feed::UpdateFetcher;
use crate::models::UpdateInfo;
use crate::progress::{ProgressChannel, ProgressSample, ProgressSubscription};
use crate::reconciler::{ReconciliationResult, StatusReaders, UpdateReconciler};
use crate::ui_events::CommandSender;

/// Collaborators the home screen needs but does not own.
pub struct HomeDeps {
    pub fetcher: Arc<dyn UpdateFetcher>,
    pub env_check: Arc<dyn EnvCheck>,
    pub events: CommandSender,
    pub connectivity: watch::Receiver<bool>,
    pub config: ConfigStore,
}

/// Results of background work, marshalled back to the UI task.
#[derive(Debug)]
enum HomeMessage {
    UpdateFetched {
        generation: u64,
        seq: u64,
        result: Result<UpdateInfo, UiError>,
    },
    EnvChecked {
        generation: u64,
        result: Result<bool, UiError>,
    },
}

/// Everything the UI binds to on the home screen.
#[derive(Clone)]
pub struct HomeCells {
    pub status: StatusReaders,
    pub notice_visible: watch::Receiver<bool>,
}

enum Next {
    Message(Option<HomeMessage>),
    Progress(Option<ProgressSample>),
    TaskDone { failed: bool },
}

/// Drives the home screen: refreshes update info off the UI task, feeds it
/// through the [`UpdateReconciler`], and turns user actions into
/// [`CommandEvent`]s.
///
/// All state mutation happens in `&mut self` methods, which are only ever
/// called from the task that owns the controller.
pub struct HomeController {
    reconciler: UpdateReconciler,
    fetcher: Arc<dyn UpdateFetcher>,
    env_check: Arc<dyn EnvCheck>,
    events: CommandSender,
    connectivity: watch::Receiver<bool>,
    config: ConfigStore,
    notice_visible: watch::Sender<bool>,
    last_known: UpdateInfo,
    progress: Option<ProgressSubscription>,
    tasks: JoinSet<()>,
    inbox_tx: mpsc::UnboundedSender<HomeMessage>,
    inbox_rx: mpsc::UnboundedReceiver<HomeMessage>,
    generation: u64,
    refresh_seq: u64,
    applied_seq: u64,
    in_flight: usize,
    torn_down: bool,
}

impl HomeController {
    pub fn new(reconciler: UpdateReconciler, deps: HomeDeps, progress: &ProgressChannel) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let notice_visible = watch::channel(deps.config.get().safety_notice).0;
        Self {
            reconciler,
            fetcher: deps.fetcher,
            env_check: deps.env_check,
            events: deps.events,
            connectivity: deps.connectivity,
            config: deps.config,
            notice_visible,
            last_known: UpdateInfo::default(),
            progress: Some(progress.subscribe()),
            tasks: JoinSet::new(),
            inbox_tx,
            inbox_rx,
            generation: 0,
            refresh_seq: 0,
            applied_seq: 0,
            in_flight: 0,
            torn_down: false,
        }
    }

    /// Snapshot used when a fetch fails before any fetch has succeeded.
    pub fn with_cached(mut self, cached: UpdateInfo) -> Self {
        self.last_known = cached;
        self
    }

    pub fn cells(&self) -> HomeCells {
        HomeCells {
            status: self.reconciler.cells().subscribe(),
            notice_visible: self.notice_visible.subscribe(),
        }
    }

    pub fn snapshot(&self) -> ReconciliationResult {
        self.reconciler.cells().snapshot()
    }

    pub fn reconciler(&self) -> &UpdateReconciler {
        &self.reconciler
    }

    pub fn last_known(&self) -> &UpdateInfo {
        &self.last_known
    }

    /// No background work is outstanding.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    /// Starts a background fetch. The result is applied by [`Self::step`]
    /// unless a later refresh has already been applied.
    pub fn refresh(&mut self) {
        if self.torn_down {
            return;
        }
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.inbox_tx.clone();
        let generation = self.generation;
        self.refresh_seq += 1;
        let seq = self.refresh_seq;
        self.in_flight += 1;
        self.tasks.spawn(async move {
            let result = fetcher.fetch_update_info().await;
            let _ = tx.send(HomeMessage::UpdateFetched {
                generation,
                seq,
                result,
            });
        });
    }

    /// Waits for the next piece of background work or progress sample and
    /// applies it. Returns `false` once there is nothing left to wait for.
    pub async fn step(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        let has_tasks = !self.tasks.is_empty();
        let next = tokio::select! {
            msg = self.inbox_rx.recv() => Next::Message(msg),
            sample = next_sample(self.progress.as_mut()) => Next::Progress(sample),
            Some(joined) = self.tasks.join_next(), if has_tasks => {
                let failed = match joined {
                    Err(err) if !err.is_cancelled() => {
                        warn!("home task failed: {err}");
                        true
                    }
                    _ => false,
                };
                Next::TaskDone { failed }
            }
        };
        match next {
            Next::Message(Some(msg)) => self.handle(msg),
            Next::Message(None) => return false,
            Next::Progress(Some(sample)) => {
                self.reconciler.apply_progress(sample);
            }
            Next::Progress(None) => self.progress = None,
            // A failed task never reported back.
            Next::TaskDone { failed: true } => {
                self.in_flight = self.in_flight.saturating_sub(1);
            }
            Next::TaskDone { failed: false } => {}
        }
        true
    }

    fn handle(&mut self, msg: HomeMessage) {
        match msg {
            HomeMessage::UpdateFetched {
                generation,
                seq,
                result,
            } => {
                if generation != self.generation {
                    return;
                }
                self.in_flight = self.in_flight.saturating_sub(1);
                if seq < self.applied_seq {
                    debug!(
                        "discarding refresh {seq}, refresh {} already applied",
                        self.applied_seq
                    );
                    return;
                }
                self.applied_seq = seq;
                self.on_update_fetched(result);
            }
            HomeMessage::EnvChecked { generation, result } => {
                if generation != self.generation {
                    return;
                }
                self.in_flight = self.in_flight.saturating_sub(1);
                self.on_env_checked(result);
            }
        }
    }

    fn on_update_fetched(&mut self, result: Result<UpdateInfo, UiError>) {
        let info = match result {
            Ok(info) => {
                telemetry::event("home.refresh", &[("result", "ok")]);
                self.last_known = info.clone();
                info
            }
            Err(err) => {
                telemetry::event("home.refresh", &[("result", "err")]);
                warn!("{err}; using last known update info");
                self.last_known.clone()
            }
        };
        let connectivity = *self.connectivity.borrow();
        let (result, env_check_due) = self.reconciler.apply(&info, connectivity);
        info!(
            tracked = %result.tracked,
            app = %result.app,
            "home status refreshed"
        );
        if env_check_due {
            self.start_env_check();
        }
    }

    fn start_env_check(&mut self) {
        let check = Arc::clone(&self.env_check);
        let tx = self.inbox_tx.clone();
        let generation = self.generation;
        self.in_flight += 1;
        self.tasks.spawn(async move {
            let result = check.run_check().await;
            let _ = tx.send(HomeMessage::EnvChecked { generation, result });
        });
    }

    fn on_env_checked(&mut self, result: Result<bool, UiError>) {
        let healthy = match result {
            Ok(healthy) => healthy,
            Err(err) => {
                warn!("{err}");
                false
            }
        };
        telemetry::event(
            "home.env_check",
            &[("result", if healthy { "ok" } else { "broken" })],
        );
        if healthy {
            info!("environment check passed");
        } else {
            info!("environment check failed, offering fix");
            self.events.publish(CommandEvent::show_env_fix_dialog());
        }
    }

    /// Cancels outstanding work and unsubscribes from progress. Nothing that
    /// was in flight will touch a cell afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.generation += 1;
        self.tasks.abort_all();
        self.progress = None;
        self.in_flight = 0;
        while self.inbox_rx.try_recv().is_ok() {}
        info!("home controller torn down");
    }

    pub fn open_link(&self, url: &str) {
        self.events.publish(CommandEvent::OpenLink(url.to_string()));
    }

    pub fn uninstall_pressed(&self) {
        self.events.publish(CommandEvent::ShowDialog(DialogKind::Uninstall));
    }

    pub fn self_install_pressed(&self) {
        self.events
            .publish(CommandEvent::ShowDialog(DialogKind::SelfInstall));
    }

    /// Asks for storage access, then opens the install screen if granted.
    pub fn install_pressed(&self) {
        let events = self.events.clone();
        self.events.publish(CommandEvent::request_permission(
            STORAGE_PERMISSION,
            move |granted| {
                if granted {
                    events.publish(CommandEvent::NavigateTo(Destination::Install));
                } else {
                    info!("storage permission denied, staying on home");
                }
            },
        ));
    }

    /// Hides the safety notice for good.
    pub fn hide_notice(&mut self) -> Result<(), UiError> {
        self.notice_visible.send_replace(false);
        self.config.update(|cfg| cfg.safety_notice = false)
    }
}

impl Drop for HomeController {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}

async fn next_sample(progress: Option<&mut ProgressSubscription>) -> Option<ProgressSample> {
    match progress {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
