use clap::Parser;

/// Dependency resolution and publication tool for Maven and Ivy repositories.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    #[clap(short, long, default_value = "mvnfetch.toml")]
    /// Name of the mvnfetch project file
    pub module_location: String,
    #[clap(short, long)]
    /// Location of the mvnfetch cache directory [default: $HOME/.mvnfetch/cache]
    pub cache_directory: Option<String>,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Resolves the dependencies of the project and prints the resolved files
    Resolve {
        /// Download everything again instead of using cached files
        #[clap(short, long)]
        refresh: bool,
    },
    /// Prints the resolved dependency tree
    Tree,
    /// Publishes the project to its publish repositories
    Publish,
    /// Cleans the mvnfetch cache
    ClearCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_cli() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parse_resolve() {
        let args = CliArgs::try_parse_from(["mvnfetch", "-c", "/cache", "resolve", "--refresh"])
            .unwrap();
        assert_eq!(args.cache_directory.as_deref(), Some("/cache"));
        assert_eq!(args.module_location, "mvnfetch.toml");
        assert!(matches!(args.cmd, Command::Resolve { refresh: true }));
    }
}
