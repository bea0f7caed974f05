use clap::Subcommand;

use crate::app_config::AppType;
use crate::cli::ui::{dim, highlight, info, success};
use crate::error::AppError;
use crate::services::ConfigService;

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Show the general config (secrets masked)
    Show {
        /// Target whose general config to show
        #[arg(value_enum)]
        app: Option<AppType>,
    },
    /// Open the general config in $EDITOR
    Edit {
        /// Target whose general config to edit
        #[arg(value_enum)]
        app: Option<AppType>,
    },
    /// Print the general config file path
    Path {
        #[arg(value_enum)]
        app: Option<AppType>,
    },
}

pub fn execute(cmd: EnvCommand, target: Option<AppType>) -> Result<(), AppError> {
    match cmd {
        EnvCommand::Show { app } => show(app.or(target).unwrap_or_default()),
        EnvCommand::Edit { app } => edit(app.or(target).unwrap_or_default()),
        EnvCommand::Path { app } => {
            let app_type = app.or(target).unwrap_or_default();
            println!("{}", ConfigService::path(app_type).display());
            Ok(())
        }
    }
}

fn show(app_type: AppType) -> Result<(), AppError> {
    let path = ConfigService::path(app_type);
    println!("{}", highlight(&format!("General config ({app_type})")));
    println!("{}", dim(&path.display().to_string()));
    println!("{}", "─".repeat(50));

    let lines = ConfigService::show(app_type)?;
    if lines.is_empty() {
        println!("{}", info("No general settings."));
        println!("Use 'persona env edit' to add some.");
        return Ok(());
    }

    let mut current_section: Option<&str> = None;
    for line in &lines {
        match line.section.as_deref() {
            Some(section) => {
                if current_section != Some(section) {
                    println!("{section}:");
                    current_section = Some(section);
                }
                println!("  {}: {}", line.key, line.value);
            }
            None => {
                current_section = None;
                println!("{}: {}", line.key, line.value);
            }
        }
    }
    Ok(())
}

fn edit(app_type: AppType) -> Result<(), AppError> {
    let path = ConfigService::edit_with(app_type, |path| {
        edit::edit_file(path).map_err(|e| AppError::io(path, e))
    })?;
    println!("{}", success(&format!("✓ Saved {}", path.display())));
    println!(
        "{}",
        info("Run 'persona use --update' to apply it to the live settings.")
    );
    Ok(())
}
