use anyhow::Result;
use attendance_export::cli::{Cli, Command};
use attendance_export::range::DateRange;
use attendance_export::settings::Settings;
use attendance_export::{
    create_app_state, create_authorizer, create_default_manager, display, logging, pipeline,
    server,
};
use clap::Parser;
use std::fs::File;
use std::io;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    logging::init(&settings.log.level);

    match cli.command {
        Command::Serve => {
            let state = create_app_state(&settings)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&settings.server.bind, state))?;
        }
        Command::Export { start, end, output } => {
            let range = DateRange::parse(Some(&start), Some(&end))?;
            let manager = create_default_manager(&settings)?;
            let options = settings.export.options();

            let summary = match &output {
                Some(path) => pipeline::export(&manager, &range, &options, File::create(path)?)?,
                None => pipeline::export(&manager, &range, &options, io::stdout().lock())?,
            };
            info!(
                %range,
                rows = summary.rows,
                failed_lookups = summary.failed_lookups,
                "export finished"
            );
        }
        Command::Preview { start, end, limit } => {
            let range = DateRange::parse(Some(&start), Some(&end))?;
            let manager = create_default_manager(&settings)?;
            display::show_preview(&manager, &range, limit)?;
        }
        Command::Setup => {
            let manager = create_default_manager(&settings)?;
            manager.setup()?;
            println!("Database at {} is ready.", settings.database.url);
        }
        Command::Token { subject, role } => {
            let token = create_authorizer(&settings).issue(&subject, &role)?;
            println!("{token}");
        }
    }

    Ok(())
}
