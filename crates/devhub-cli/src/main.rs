use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use devhub_ui::{
    clip_version, ActivityOps, ActivityResultCallback, CapabilitySet, CommandBus, ConfigStore,
    ContextOps, Destination, DeviceInfo, DialogKind, Dispatcher, FeedFetcher, HomeController,
    HomeDeps, LocalVersions, NoticeDuration, PermissionCallback, PickRequest, ProgressChannel,
    ShellEnvCheck, UiError, UiSurface, UpdateFetcher, UpdateReconciler, DEFAULT_EVENT_QUEUE_SIZE,
};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "devhub", version, about = "Device manager home screen driver")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Fetch the update feed once and print both component statuses
    Status {
        #[command(flatten)]
        feed: FeedArgs,
    },
    /// Print the part of one version label that differs from another
    Clip { version: String, other: String },
    /// Run the home screen against a console surface until it settles
    Home {
        #[command(flatten)]
        feed: FeedArgs,
        /// Answer permission prompts with "granted"
        #[arg(long)]
        grant: bool,
        /// Press the install button once the screen is up
        #[arg(long)]
        install: bool,
        /// Dismiss the safety notice for good
        #[arg(long)]
        hide_notice: bool,
    },
}

#[derive(Args)]
struct FeedArgs {
    /// Feed URL or path; defaults to the configured feed
    #[arg(long)]
    feed: Option<String>,
    #[arg(long, default_value_t = 0)]
    installed_code: u32,
    #[arg(long, default_value = "")]
    installed_label: String,
    #[arg(long, default_value_t = 0)]
    build_code: u32,
    #[arg(long, default_value = "")]
    build_label: String,
    /// Treat the network as unavailable
    #[arg(long)]
    offline: bool,
}

impl FeedArgs {
    fn local(&self) -> LocalVersions {
        LocalVersions {
            installed_code: self.installed_code,
            installed_label: self.installed_label.clone(),
            own_build_code: self.build_code,
            own_build_label: self.build_label.clone(),
        }
    }

    fn source(&self, config: &ConfigStore) -> Result<String, UiError> {
        self.feed
            .clone()
            .filter(|source| !source.trim().is_empty())
            .or_else(|| config.get().feed_source())
            .ok_or_else(|| UiError::Config("no feed given and none configured".into()))
    }

    fn fetcher(&self, config: &ConfigStore) -> Result<FeedFetcher, UiError> {
        Ok(FeedFetcher::new(self.source(config)?).with_channel(config.get().update_channel.clone()))
    }
}

/// Prints every command it receives. Has no file picker.
struct ConsoleSurface {
    grant: bool,
}

impl ContextOps for ConsoleSurface {
    fn show_dialog(&mut self, kind: DialogKind) {
        println!("[dialog] {kind:?}");
    }

    fn add_home_shortcut(&mut self) {
        println!("[shortcut] added");
    }

    fn open_link(&mut self, url: &str) {
        println!("[link] {url}");
    }

    fn show_markdown(&mut self, title: &str, text: &str) {
        println!("[markdown] {title}\n{text}");
    }

    fn show_notice(&mut self, message: &str, duration: NoticeDuration) {
        println!("[notice:{duration:?}] {message}");
    }
}

impl ActivityOps for ConsoleSurface {
    fn go_back(&mut self) {
        println!("[back]");
    }

    fn finish(&mut self) {
        println!("[finish]");
    }

    fn attach_content(&mut self) {
        println!("[attach]");
    }

    fn recreate(&mut self) {
        println!("[recreate]");
    }

    fn navigate(&mut self, destination: &Destination) {
        println!("[navigate] {destination:?}");
    }

    fn request_permission(&mut self, permission: &str, callback: PermissionCallback) {
        println!(
            "[permission] {permission}: {}",
            if self.grant { "granted" } else { "denied" }
        );
        callback.resolve(self.grant);
    }

    fn launch_for_result(
        &mut self,
        request: PickRequest,
        _callback: ActivityResultCallback,
    ) -> Result<(), UiError> {
        Err(UiError::LauncherUnavailable {
            action: format!("pick {}", request.mime_type),
        })
    }
}

impl UiSurface for ConsoleSurface {
    fn name(&self) -> &str {
        "console"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::ACTIVITY
    }

    fn as_context(&mut self) -> Option<&mut dyn ContextOps> {
        Some(self)
    }

    fn as_activity(&mut self) -> Option<&mut dyn ActivityOps> {
        Some(self)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    devhub_util::init_tracing()?;
    devhub_telemetry::init_with_env("devhub", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Status { feed } => {
            let config = ConfigStore::open_default();
            let fetcher = feed.fetcher(&config)?;
            let info = fetcher.fetch_update_info().await?;
            let reconciler = UpdateReconciler::new(feed.local(), DeviceInfo::from_env());
            let result = reconciler.reconcile(&info, !feed.offline);
            println!(
                "tracked\t{}\t{}\t{}",
                result.tracked,
                result.tracked.tracked_text(),
                result.tracked_diff
            );
            println!(
                "app\t{}\t{}\t{}",
                result.app,
                result.app.app_text(),
                result.app_diff
            );
        }
        Cmd::Clip { version, other } => {
            println!("{}", clip_version(&version, &other));
        }
        Cmd::Home {
            feed,
            grant,
            install,
            hide_notice,
        } => run_home(feed, grant, install, hide_notice).await?,
    }

    Ok(())
}

async fn run_home(
    feed: FeedArgs,
    grant: bool,
    install: bool,
    hide_notice: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigStore::open_default();
    let fetcher = feed.fetcher(&config)?;
    let env_check = ShellEnvCheck::new(config.get().env_check_command.clone());

    let (bus, mut notify) = CommandBus::new(DEFAULT_EVENT_QUEUE_SIZE);
    let mut dispatcher = Dispatcher::new(Arc::clone(&bus));
    let progress = ProgressChannel::default();
    let (_online, connectivity) = watch::channel(!feed.offline);

    let mut home = HomeController::new(
        UpdateReconciler::new(feed.local(), DeviceInfo::from_env()),
        HomeDeps {
            fetcher: Arc::new(fetcher),
            env_check: Arc::new(env_check),
            events: dispatcher.sender(),
            connectivity,
            config,
        },
        &progress,
    );
    let cells = home.cells();

    dispatcher.attach(Box::new(ConsoleSurface { grant }));
    home.refresh();
    if install {
        home.install_pressed();
    }
    if hide_notice {
        home.hide_notice()?;
    }

    loop {
        dispatcher.pump();
        dispatcher.reap();
        if home.is_idle() && bus.is_empty() {
            break;
        }
        tokio::select! {
            alive = home.step() => {
                if !alive {
                    break;
                }
            }
            Some(()) = notify.recv() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    home.teardown();
    dispatcher.detach();

    let status = &cells.status;
    println!(
        "tracked\t{}\t{}",
        *status.tracked_text.borrow(),
        *status.tracked_diff.borrow()
    );
    println!(
        "app\t{}\t{}",
        *status.app_text.borrow(),
        *status.app_diff.borrow()
    );
    println!("notice\t{}", *cells.notice_visible.borrow());
    Ok(())
}
