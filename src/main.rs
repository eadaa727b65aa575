use std::error::Error;

use clap::Parser;

use mvnfetch::{
    cli::args::{CliArgs, Command},
    config::MvnfetchConfig,
    Mvnfetch,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();
    let config = MvnfetchConfig::load()?;

    let mut builder = Mvnfetch::builder()
        .module_file_name(&cli_args.module_location)
        .http_settings(config.http);
    if let Some(cache_directory) = cli_args.cache_directory.map(Into::into).or(config.cache_dir) {
        builder = builder.cache_directory(cache_directory);
    }
    let mvnfetch = builder.try_build()?;

    match cli_args.cmd {
        Command::Resolve { refresh } => {
            for file in mvnfetch.resolve(refresh)?.files() {
                println!("{}", file.display());
            }
            Ok(())
        }
        Command::Tree => {
            for line in mvnfetch.tree()? {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Publish => {
            mvnfetch.publish(None)?;
            Ok(())
        }
        Command::ClearCache => mvnfetch.clear_cache(),
    }
}
