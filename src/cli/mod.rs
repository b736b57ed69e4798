pub mod dates;
pub mod output;
pub mod report;
pub mod session;
pub mod settings;
pub mod shutdown;

use std::{path::Path, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    engine::{
        indicator::MarkerFileIndicator,
        settings::SettingsStore,
        storage::{record_storage::RecordStorageImpl, timer_state::FileTimerStateStorage},
        RolloverOutcome, Tracker,
    },
    usage::system::SystemUsageFeed,
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

use self::{
    report::{BreakdownCommand, MonthCommand, TodayCommand},
    session::{EditCommand, StatusCommand, StopCommand},
    settings::SettingsCommand,
};

pub type CliTracker = Tracker<RecordStorageImpl, FileTimerStateStorage>;

#[derive(Parser, Debug)]
#[command(name = "Playtime", version, long_about = None)]
#[command(about = "Time your activities and compare them with a daily goal", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start timing a session. A session that is already running is discarded")]
    Start {},
    #[command(about = "Stop the session and assign its time to an activity")]
    Stop {
        #[command(flatten)]
        command: StopCommand,
    },
    #[command(about = "Show the running session and today's progress")]
    Status {
        #[command(flatten)]
        command: StatusCommand,
    },
    #[command(about = "Overwrite the total time of an activity on a day")]
    Edit {
        #[command(flatten)]
        command: EditCommand,
    },
    #[command(about = "List the records of a day")]
    Today {
        #[command(flatten)]
        command: TodayCommand,
    },
    #[command(about = "Show daily progress towards the target for a month")]
    Month {
        #[command(flatten)]
        command: MonthCommand,
    },
    #[command(about = "Show where today's time went, activities and apps together")]
    Breakdown {
        #[command(flatten)]
        command: BreakdownCommand,
    },
    #[command(about = "List the activities time can be assigned to")]
    Categories {},
    #[command(about = "Show or change settings")]
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock::new());
    let mut tracker = open_tracker(&dir, clock.clone()).await?;
    if let RolloverOutcome::Rolled { from, to } = tracker.check_date_rollover().await? {
        info!("Logical date moved from {from} to {to}");
    }

    match args.commands {
        Commands::Start {} => session::process_start_command(&mut tracker).await,
        Commands::Stop { command } => session::process_stop_command(&mut tracker, command).await,
        Commands::Status { command } => {
            session::process_status_command(&mut tracker, clock, command).await
        }
        Commands::Edit { command } => {
            session::process_edit_command(&mut tracker, clock, command).await
        }
        Commands::Today { command } => {
            report::process_today_command(&tracker, clock, command).await
        }
        Commands::Month { command } => report::process_month_command(&tracker, command).await,
        Commands::Breakdown { command } => {
            report::process_breakdown_command(&mut tracker, command).await
        }
        Commands::Categories {} => {
            report::print_categories();
            Ok(())
        }
        Commands::Settings { command } => {
            settings::process_settings_command(&mut tracker, command).await
        }
    }
}

/// Wires the file based stores living in `dir` into a [Tracker].
pub async fn open_tracker(dir: &Path, clock: Arc<dyn Clock>) -> Result<CliTracker> {
    Tracker::new(
        RecordStorageImpl::new(dir.join("records"))?,
        FileTimerStateStorage::new(dir.join("timer_state.json")),
        Box::new(MarkerFileIndicator::new(dir.join("ongoing.json"))),
        Box::new(SystemUsageFeed::new(clock.clone())),
        SettingsStore::new(dir.join("settings.json")),
        clock,
    )
    .await
}
