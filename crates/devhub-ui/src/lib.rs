//! UI command dispatch and update-status reconciliation for the device
//! manager home screen.
//!
//! Controllers never hold a concrete surface. They publish [`CommandEvent`]s
//! onto a [`CommandBus`]; the [`Dispatcher`] routes each one to whichever
//! [`UiSurface`] is attached, checking the event's required [`Capability`]
//! first. The [`HomeController`] turns fetched [`UpdateInfo`] into observable
//! status cells through an [`UpdateReconciler`].

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod env_check;
pub mod error;
pub mod feed;
pub mod home;
pub mod models;
pub mod progress;
pub mod reconciler;
pub mod surface;
pub mod ui_events;
pub mod version;

pub use commands::{
    ActivityResult, ActivityResultCallback, ChangelogItem, CommandEvent, Destination, DialogKind,
    NoticeDuration, PermissionCallback, PickPurpose, PickRequest, ReadmeSource,
};
pub use config::{AppConfig, ConfigStore};
pub use dispatcher::{Dispatcher, ErrorSink, TracingErrorSink};
pub use env_check::{EnvCheck, ShellEnvCheck};
pub use error::UiError;
pub use feed::{parse_channel_feed, parse_feed, FeedFetcher, RemoteReadme, UpdateFetcher};
pub use home::{HomeCells, HomeController, HomeDeps};
pub use models::{ComponentStatus, DeviceInfo, LocalVersions, UpdateInfo, VersionFact};
pub use progress::{ProgressChannel, ProgressReporter, ProgressSample, ProgressSubscription, SubjectTag};
pub use reconciler::{ReconciliationResult, StatusCells, StatusReaders, UpdateReconciler};
pub use surface::{ActivityOps, Capability, CapabilitySet, ContextOps, FragmentOps, UiSurface};
pub use ui_events::{CommandBus, CommandSender, DEFAULT_EVENT_QUEUE_SIZE};
pub use version::clip_version;
