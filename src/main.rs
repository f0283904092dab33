use clap::Parser;

use std::path::PathBuf;
use std::sync::Arc;

use medlink::{setup_local_tracing, AppResult, ClientConfig, ConnectionPool, Destination};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
    /// send a single request to the configured broker and print the reply
    Ping,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    setup_local_tracing()?;

    let commandline: CommandLine = CommandLine::parse();
    let config = match commandline.conf.as_ref() {
        Some(path) => ClientConfig::set_up_config(PathBuf::from(path))?,
        None => ClientConfig::default(),
    };

    match commandline.command {
        Some(Command::PrintConfig) => {
            println!("{config:#?}");
        }
        Some(Command::Ping) | None => {
            let destination = Destination::from(&config.broker);
            let pool = Arc::new(ConnectionPool::new(
                config.pool.clone(),
                config.network.clone(),
            ));
            let mut leased = pool.acquire(&destination).await?;
            let reply = leased.query("PING").await?;
            println!("{reply}");
            pool.release(leased, true).await;
        }
    }

    Ok(())
}
