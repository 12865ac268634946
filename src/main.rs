use anyhow::Result;
use clap::Parser;

use promote::cli::commands;
use promote::cli::{Cli, Commands};
use promote::logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let ctx = commands::load_context(&cli)?;

    match cli.command {
        Commands::Move {
            ref old,
            ref new,
            dry_run,
            no_move,
        } => {
            let (output, has_failures) =
                commands::run_move(&ctx, old, new, dry_run, no_move, &cli.format)?;
            println!("{}", output);
            if has_failures {
                std::process::exit(1);
            }
        }

        Commands::Deps { ref path } => {
            let output = commands::run_deps(&ctx, path, &cli.format)?;
            println!("{}", output);
        }

        Commands::Delta { ref old, ref new } => {
            let output = commands::run_delta(&ctx, old, new, &cli.format)?;
            println!("{}", output);
        }
    }

    Ok(())
}
