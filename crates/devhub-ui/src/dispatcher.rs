use std::sync::Arc;

use devhub_telemetry as telemetry;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::commands::{
    ActivityResult, ChangelogItem, CommandEvent, Destination, NoticeDuration, PickRequest,
};
use crate::error::UiError;
use crate::surface::{Capability, UiSurface};
use crate::ui_events::{CommandBus, CommandSender};

const APP_NOT_FOUND: &str = "No app found to handle this action";
const PATCH_FILE_HINT: &str = "Select the file to patch";

/// Receives every event the dispatcher had to drop.
pub trait ErrorSink: Send {
    fn report(&mut self, error: &UiError);
}

#[derive(Debug, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&mut self, error: &UiError) {
        warn!("dropped command: {error}");
    }
}

/// Routes [`CommandEvent`]s to the attached [`UiSurface`].
///
/// Owned by the UI task. Events published while no surface is attached stay
/// on the bus until [`Dispatcher::attach`] flushes them.
///
/// Background fetches run on the tokio runtime current at construction, or
/// the one given to [`Dispatcher::with_runtime`]; a UI thread outside any
/// runtime must supply one.
pub struct Dispatcher {
    bus: Arc<CommandBus>,
    surface: Option<Box<dyn UiSurface>>,
    routes: Routes,
    errors: Box<dyn ErrorSink>,
}

/// Dispatch state that does not involve the attached surface, split out so a
/// surface borrowed from the dispatcher can be passed alongside it.
struct Routes {
    sender: CommandSender,
    tasks: JoinSet<()>,
    runtime: Option<Handle>,
}

impl Dispatcher {
    pub fn new(bus: Arc<CommandBus>) -> Self {
        let sender = bus.sender();
        Self {
            bus,
            surface: None,
            routes: Routes {
                sender,
                tasks: JoinSet::new(),
                runtime: Handle::try_current().ok(),
            },
            errors: Box::new(TracingErrorSink),
        }
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.routes.runtime = Some(runtime);
        self
    }

    pub fn with_error_sink(mut self, sink: Box<dyn ErrorSink>) -> Self {
        self.errors = sink;
        self
    }

    pub fn sender(&self) -> CommandSender {
        self.routes.sender.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    /// Makes `surface` the dispatch target and flushes anything pending.
    /// Returns how many events were dispatched.
    pub fn attach(&mut self, surface: Box<dyn UiSurface>) -> usize {
        info!(
            "attached surface {} ({})",
            surface.name(),
            surface.capabilities()
        );
        self.surface = Some(surface);
        self.pump()
    }

    /// Stops dispatching. Background fetches started for the old surface are
    /// cancelled.
    pub fn detach(&mut self) -> Option<Box<dyn UiSurface>> {
        self.routes.tasks.abort_all();
        let surface = self.surface.take();
        if let Some(surface) = &surface {
            info!("detached surface {}", surface.name());
        }
        surface
    }

    /// Dispatches everything on the bus to the attached surface. Does nothing
    /// while detached.
    pub fn pump(&mut self) -> usize {
        let Some(surface) = self.surface.as_mut() else {
            return 0;
        };
        let events = self.bus.drain();
        let count = events.len();
        for event in events {
            let name = event.name();
            let result = self.routes.dispatch(event, surface.as_mut());
            record(name, &result);
            if let Err(err) = result {
                self.errors.report(&err);
            }
        }
        count
    }

    /// Dispatches one event against `surface`, reporting any failure to the
    /// error sink as well as returning it.
    pub fn dispatch(
        &mut self,
        event: CommandEvent,
        surface: &mut dyn UiSurface,
    ) -> Result<(), UiError> {
        let name = event.name();
        let result = self.routes.dispatch(event, surface);
        record(name, &result);
        if let Err(err) = &result {
            self.errors.report(err);
        }
        result
    }

    /// Reaps finished background tasks.
    pub fn reap(&mut self) {
        while let Some(result) = self.routes.tasks.try_join_next() {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    warn!("dispatcher task failed: {err}");
                }
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.routes.tasks.abort_all();
    }
}

fn record(name: &str, result: &Result<(), UiError>) {
    let outcome = match result {
        Ok(()) => "ok",
        Err(UiError::CapabilityMismatch { .. }) => "mismatch",
        Err(UiError::LauncherUnavailable { .. }) => "no_launcher",
        Err(_) => "err",
    };
    telemetry::event(
        "ui.command.dispatch",
        &[("event", name), ("result", outcome)],
    );
}

impl Routes {
    fn dispatch(&mut self, event: CommandEvent, surface: &mut dyn UiSurface) -> Result<(), UiError> {
        let required = event.required_capability();
        let available = surface.capabilities();
        if !available.contains(required) {
            return Err(UiError::CapabilityMismatch {
                event: event.name(),
                required,
                available,
            });
        }
        debug!("dispatching {event:?} to {}", surface.name());
        let mismatch = UiError::CapabilityMismatch {
            event: event.name(),
            required,
            available,
        };

        match required {
            Capability::Context => {
                let context = surface.as_context().ok_or(mismatch)?;
                match event {
                    CommandEvent::ShowChangelog(item) => self.fetch_changelog(item),
                    CommandEvent::AddHomeShortcut => context.add_home_shortcut(),
                    CommandEvent::ShowDialog(kind) => context.show_dialog(kind),
                    CommandEvent::OpenLink(url) => context.open_link(&url),
                    CommandEvent::RenderMarkdown { title, text } => {
                        context.show_markdown(&title, &text)
                    }
                    CommandEvent::Notice { message, duration } => {
                        context.show_notice(&message, duration)
                    }
                    other => unreachable_route(&other),
                }
                Ok(())
            }
            Capability::Activity => {
                let activity = surface.as_activity().ok_or(mismatch)?;
                match event {
                    CommandEvent::RunOnSurface(action) => action(activity),
                    CommandEvent::RequestPermission {
                        permission,
                        callback,
                    } => activity.request_permission(&permission, callback),
                    CommandEvent::GoBack => activity.go_back(),
                    CommandEvent::Finish => activity.finish(),
                    CommandEvent::AttachUi => activity.attach_content(),
                    CommandEvent::Recreate => activity.recreate(),
                    CommandEvent::NavigateTo(destination) => activity.navigate(&destination),
                    CommandEvent::PickInstallFile(callback) => {
                        match activity.launch_for_result(PickRequest::install_file(), callback) {
                            Ok(()) => activity.show_notice(PATCH_FILE_HINT, NoticeDuration::Long),
                            Err(err) => {
                                activity.show_notice(APP_NOT_FOUND, NoticeDuration::Short);
                                return Err(err);
                            }
                        }
                    }
                    other => unreachable_route(&other),
                }
                Ok(())
            }
            Capability::Fragment => {
                let fragment = surface.as_fragment().ok_or(mismatch)?;
                match event {
                    CommandEvent::PickModuleZip => {
                        let sender = self.sender.clone();
                        let launched = fragment.launch_via_activity(
                            PickRequest::module_zip(),
                            Box::new(move |result| {
                                if let ActivityResult::Ok(Some(uri)) = result {
                                    sender.publish(CommandEvent::NavigateTo(
                                        Destination::FlashZip { uri },
                                    ));
                                }
                            }),
                        );
                        if let Err(err) = launched {
                            fragment.show_notice(APP_NOT_FOUND, NoticeDuration::Short);
                            return Err(err);
                        }
                    }
                    other => unreachable_route(&other),
                }
                Ok(())
            }
        }
    }

    /// Fetches the readme off the UI task; the text comes back as a
    /// [`CommandEvent::RenderMarkdown`]. A failed fetch shows nothing.
    fn fetch_changelog(&mut self, item: ChangelogItem) {
        let Some(runtime) = self.runtime.as_ref() else {
            warn!("no runtime to fetch the changelog for {}", item.title);
            return;
        };
        let sender = self.sender.clone();
        let fetch = async move {
            match item.readme.readme().await {
                Ok(text) => {
                    sender.publish(CommandEvent::RenderMarkdown {
                        title: item.title,
                        text,
                    });
                }
                Err(err) => debug!("changelog for {} unavailable: {err}", item.title),
            }
        };
        self.tasks.spawn_on(fetch, runtime);
    }
}

fn unreachable_route(event: &CommandEvent) {
    // required_capability() and the route arms above are kept in sync.
    debug_assert!(false, "{} routed to the wrong capability arm", event.name());
    warn!("{} routed to the wrong capability arm", event.name());
}
