use anyhow::Result;
use clap::Subcommand;

use crate::{
    engine::settings::RolloverPolicy,
    utils::time::format_target,
};

use super::CliTracker;

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    #[command(about = "Print current settings")]
    Show {},
    #[command(about = "Set the daily target. It's rounded down to 30 minutes, between 30 minutes and 24 hours")]
    Target {
        #[arg(long, default_value_t = 0)]
        hours: u64,
        #[arg(long, default_value_t = 0)]
        minutes: u64,
    },
    #[command(about = "Choose what happens to a running session at midnight")]
    Rollover {
        #[arg(value_enum)]
        policy: RolloverPolicy,
    },
}

pub async fn process_settings_command(
    tracker: &mut CliTracker,
    command: SettingsCommand,
) -> Result<()> {
    match command {
        SettingsCommand::Show {} => {
            let settings = tracker.settings();
            println!("target\t{}", format_target(settings.target_seconds));
            println!("rollover\t{}", settings.rollover_policy);
        }
        SettingsCommand::Target { hours, minutes } => {
            let seconds = hours.saturating_mul(3600).saturating_add(minutes.saturating_mul(60));
            let target = tracker.set_target_seconds(seconds).await?;
            println!("Daily target set to {}", format_target(target));
        }
        SettingsCommand::Rollover { policy } => {
            tracker.set_rollover_policy(policy).await?;
            println!("Rollover policy set to {policy}");
        }
    }
    Ok(())
}
