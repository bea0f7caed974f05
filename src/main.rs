use clap::Parser;
use persona_lib::cli::commands::{env, provider, theme};
use persona_lib::cli::{ui, Cli, Commands};
use persona_lib::AppError;
use std::process;

fn main() {
    let cli = Cli::parse();

    // 默认只显示错误日志，避免干扰命令输出
    let log_level = if cli.verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    ui::set_accent_target(cli.target);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let target = cli.target;
    match cli.command {
        None | Some(Commands::Status) => provider::status(),
        Some(Commands::List) => provider::list(target),
        Some(Commands::Show { id }) => provider::show(&id),
        Some(Commands::Use {
            id,
            update,
            dry_run,
        }) => provider::use_provider(id, target, update, dry_run),
        Some(Commands::Add(fields)) => provider::add(fields, target),
        Some(Commands::Edit { id, fields }) => provider::edit(&id, fields),
        Some(Commands::Remove { id, yes }) => provider::remove(id, target, yes),
        Some(Commands::Ping { id }) => provider::ping(id, target),
        Some(Commands::Reset) => provider::reset(target),
        Some(Commands::Env(cmd)) => env::execute(cmd, target),
        Some(Commands::Theme { name }) => theme::execute(name),
        Some(Commands::Completions { shell }) => {
            persona_lib::cli::generate_completions(shell);
            Ok(())
        }
    }
}
