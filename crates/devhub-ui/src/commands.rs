use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::UiError;
use crate::surface::{ActivityOps, Capability};

pub const STORAGE_PERMISSION: &str = "android.permission.WRITE_EXTERNAL_STORAGE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Home,
    Install,
    Modules,
    Settings,
    FlashZip { uri: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DialogKind {
    EnvFix,
    SelfInstall,
    Uninstall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeDuration {
    Short,
    Long,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickPurpose {
    InstallFile,
    ModuleZip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickRequest {
    pub purpose: PickPurpose,
    pub mime_type: String,
}

impl PickRequest {
    pub fn install_file() -> Self {
        Self {
            purpose: PickPurpose::InstallFile,
            mime_type: "*/*".into(),
        }
    }

    pub fn module_zip() -> Self {
        Self {
            purpose: PickPurpose::ModuleZip,
            mime_type: "application/zip".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivityResult {
    Ok(Option<String>),
    Canceled,
}

pub type ActivityResultCallback = Box<dyn FnOnce(ActivityResult) + Send>;

pub type SurfaceAction = Box<dyn FnOnce(&mut dyn ActivityOps) + Send>;

/// Answer to a permission request.
///
/// Consumed by [`PermissionCallback::resolve`]. A callback dropped without an
/// answer reports a denial, so the requester always hears back once.
pub struct PermissionCallback {
    inner: Option<Box<dyn FnOnce(bool) + Send>>,
}

impl PermissionCallback {
    pub fn new(callback: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            inner: Some(Box::new(callback)),
        }
    }

    pub fn resolve(mut self, granted: bool) {
        if let Some(callback) = self.inner.take() {
            callback(granted);
        }
    }
}

impl Drop for PermissionCallback {
    fn drop(&mut self) {
        if let Some(callback) = self.inner.take() {
            callback(false);
        }
    }
}

impl fmt::Debug for PermissionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionCallback")
            .field("pending", &self.inner.is_some())
            .finish()
    }
}

pub trait ReadmeSource: Send + Sync {
    fn readme(&self) -> BoxFuture<'_, Result<String, UiError>>;
}

/// A module entry whose readme can be shown as a changelog.
#[derive(Clone)]
pub struct ChangelogItem {
    pub title: String,
    pub readme: Arc<dyn ReadmeSource>,
}

impl fmt::Debug for ChangelogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangelogItem")
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// A one-shot instruction for whichever surface is attached.
pub enum CommandEvent {
    RunOnSurface(SurfaceAction),
    ShowChangelog(ChangelogItem),
    RequestPermission {
        permission: String,
        callback: PermissionCallback,
    },
    GoBack,
    Finish,
    AttachUi,
    Recreate,
    PickInstallFile(ActivityResultCallback),
    NavigateTo(Destination),
    AddHomeShortcut,
    PickModuleZip,
    ShowDialog(DialogKind),
    OpenLink(String),
    /// Second half of [`CommandEvent::ShowChangelog`], published once the
    /// readme has been fetched.
    RenderMarkdown { title: String, text: String },
    Notice {
        message: String,
        duration: NoticeDuration,
    },
}

/// Pending events sharing a key replace each other; only the latest survives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
    Navigation,
    Dialog(DialogKind),
}

impl CommandEvent {
    pub fn show_env_fix_dialog() -> Self {
        Self::ShowDialog(DialogKind::EnvFix)
    }

    pub fn request_permission(
        permission: impl Into<String>,
        callback: impl FnOnce(bool) + Send + 'static,
    ) -> Self {
        Self::RequestPermission {
            permission: permission.into(),
            callback: PermissionCallback::new(callback),
        }
    }

    pub fn required_capability(&self) -> Capability {
        match self {
            Self::RunOnSurface(_)
            | Self::RequestPermission { .. }
            | Self::GoBack
            | Self::Finish
            | Self::AttachUi
            | Self::Recreate
            | Self::PickInstallFile(_)
            | Self::NavigateTo(_) => Capability::Activity,
            Self::PickModuleZip => Capability::Fragment,
            Self::ShowChangelog(_)
            | Self::AddHomeShortcut
            | Self::ShowDialog(_)
            | Self::OpenLink(_)
            | Self::RenderMarkdown { .. }
            | Self::Notice { .. } => Capability::Context,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RunOnSurface(_) => "run_on_surface",
            Self::ShowChangelog(_) => "show_changelog",
            Self::RequestPermission { .. } => "request_permission",
            Self::GoBack => "go_back",
            Self::Finish => "finish",
            Self::AttachUi => "attach_ui",
            Self::Recreate => "recreate",
            Self::PickInstallFile(_) => "pick_install_file",
            Self::NavigateTo(_) => "navigate_to",
            Self::AddHomeShortcut => "add_home_shortcut",
            Self::PickModuleZip => "pick_module_zip",
            Self::ShowDialog(_) => "show_dialog",
            Self::OpenLink(_) => "open_link",
            Self::RenderMarkdown { .. } => "render_markdown",
            Self::Notice { .. } => "notice",
        }
    }

    pub fn coalesce_key(&self) -> Option<CoalesceKey> {
        match self {
            Self::NavigateTo(_) => Some(CoalesceKey::Navigation),
            Self::ShowDialog(kind) => Some(CoalesceKey::Dialog(*kind)),
            _ => None,
        }
    }
}

impl fmt::Debug for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NavigateTo(destination) => write!(f, "NavigateTo({destination:?})"),
            Self::ShowDialog(kind) => write!(f, "ShowDialog({kind:?})"),
            Self::OpenLink(url) => write!(f, "OpenLink({url})"),
            Self::ShowChangelog(item) => write!(f, "ShowChangelog({})", item.title),
            Self::RequestPermission { permission, .. } => {
                write!(f, "RequestPermission({permission})")
            }
            Self::Notice { message, .. } => write!(f, "Notice({message})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn lifecycle_events_need_an_activity() {
        for event in [
            CommandEvent::GoBack,
            CommandEvent::Finish,
            CommandEvent::AttachUi,
            CommandEvent::Recreate,
            CommandEvent::NavigateTo(Destination::Install),
        ] {
            assert_eq!(event.required_capability(), Capability::Activity);
        }
        assert_eq!(
            CommandEvent::PickModuleZip.required_capability(),
            Capability::Fragment
        );
        assert_eq!(
            CommandEvent::AddHomeShortcut.required_capability(),
            Capability::Context
        );
        assert_eq!(
            CommandEvent::show_env_fix_dialog().required_capability(),
            Capability::Context
        );
    }

    #[test]
    fn dropped_permission_callback_reports_denial_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let denied = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            let denied = Arc::clone(&denied);
            let _callback = PermissionCallback::new(move |granted| {
                calls.fetch_add(1, Ordering::SeqCst);
                if !granted {
                    denied.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(denied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolved_permission_callback_is_not_called_again_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let callback = PermissionCallback::new(move |granted| {
            assert!(granted);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        callback.resolve(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_navigation_and_dialogs_coalesce() {
        assert_eq!(
            CommandEvent::NavigateTo(Destination::Home).coalesce_key(),
            Some(CoalesceKey::Navigation)
        );
        assert_eq!(
            CommandEvent::ShowDialog(DialogKind::Uninstall).coalesce_key(),
            Some(CoalesceKey::Dialog(DialogKind::Uninstall))
        );
        assert_eq!(CommandEvent::GoBack.coalesce_key(), None);
    }
}
