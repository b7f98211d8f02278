use std::fmt;

use crate::commands::{
    ActivityResultCallback, Destination, DialogKind, NoticeDuration, PermissionCallback,
    PickRequest,
};
use crate::error::UiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Resolves resources and launches actions that return nothing.
    Context,
    /// A full surface with lifecycle and activity-result support.
    Activity,
    /// A sub-surface that launches result flows through its owning activity.
    Fragment,
}

impl Capability {
    const ALL: [Capability; 3] = [Capability::Context, Capability::Activity, Capability::Fragment];

    fn bit(self) -> u8 {
        match self {
            Self::Context => 1,
            Self::Activity => 1 << 1,
            Self::Fragment => 1 << 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Activity => "activity",
            Self::Fragment => "fragment",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const EMPTY: Self = Self(0);
    pub const CONTEXT: Self = Self(1);
    /// Activities are contexts too.
    pub const ACTIVITY: Self = Self(1 | 1 << 1);
    pub const FRAGMENT: Self = Self(1 | 1 << 2);

    pub fn of(capabilities: &[Capability]) -> Self {
        capabilities
            .iter()
            .fold(Self::EMPTY, |set, cap| set.with(*cap))
    }

    pub fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |cap| self.contains(*cap))
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::as_str).collect();
        if names.is_empty() {
            f.write_str("nothing")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilitySet({self})")
    }
}

pub trait ContextOps {
    fn show_dialog(&mut self, kind: DialogKind);
    fn add_home_shortcut(&mut self);
    fn open_link(&mut self, url: &str);
    fn show_markdown(&mut self, title: &str, text: &str);
    fn show_notice(&mut self, message: &str, duration: NoticeDuration);
}

pub trait ActivityOps: ContextOps {
    fn go_back(&mut self);
    fn finish(&mut self);
    fn attach_content(&mut self);
    fn recreate(&mut self);
    fn navigate(&mut self, destination: &Destination);
    /// Runs the platform permission flow. The callback answers exactly once.
    fn request_permission(&mut self, permission: &str, callback: PermissionCallback);
    /// Starts a result-returning flow. Fails with
    /// [`UiError::LauncherUnavailable`] when nothing can handle `request`.
    fn launch_for_result(
        &mut self,
        request: PickRequest,
        callback: ActivityResultCallback,
    ) -> Result<(), UiError>;
}

pub trait FragmentOps: ContextOps {
    /// Hands a result-returning flow to the owning activity.
    fn launch_via_activity(
        &mut self,
        request: PickRequest,
        callback: ActivityResultCallback,
    ) -> Result<(), UiError>;
}

/// Something that can be attached to the [`crate::Dispatcher`].
///
/// `capabilities` is the contract the dispatcher checks; the `as_*`
/// accessors hand out the matching operations.
pub trait UiSurface: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    fn as_context(&mut self) -> Option<&mut dyn ContextOps>;

    fn as_activity(&mut self) -> Option<&mut dyn ActivityOps> {
        None
    }

    fn as_fragment(&mut self) -> Option<&mut dyn FragmentOps> {
        None
    }
}
