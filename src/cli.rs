use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cdmix")]
#[command(author, version, about = "Build audio CDs from video links, one session at a time", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe a URL and print the chosen audio format
    Probe {
        url: String,

        /// Single fast client instead of the smart race
        #[arg(long)]
        fast: bool,

        /// Print the raw probe result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Locate yt-dlp, ffmpeg and zip and report their versions
    CheckTools,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["cdmix"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_probe_flags() {
        let cli = Cli::try_parse_from(["cdmix", "probe", "https://youtu.be/dQw4w9WgXcQ", "--fast", "--json"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Probe {
                url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
                fast: true,
                json: true,
            })
        );
    }

    #[test]
    fn test_serve_port() {
        let cli = Cli::try_parse_from(["cdmix", "serve", "--port", "9000"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Serve { port: Some(9000) }));
    }
}
