//! ftp-channel - Entry Point
//!
//! Opens a control channel, logs in and runs the commands given on the
//! command line as one pipeline.
//!
//! ```text
//! ftp-channel <uri> [command ...]
//! ftp-channel ftp://ftp.example.org PWD "SIZE /pub/README"
//! ```

use log::{info, warn};

use ftp_channel::utils::logging::setup_logging;
use ftp_channel::{Channel, ChannelConfig, ChannelError};

#[tokio::main]
async fn main() {
    setup_logging();

    let mut args = std::env::args().skip(1);
    let Some(uri) = args.next() else {
        eprintln!("usage: ftp-channel <uri> [command ...]");
        std::process::exit(2);
    };
    let commands: Vec<String> = args.collect();

    let config = ChannelConfig::load().unwrap_or_else(|e| {
        warn!("Falling back to default configuration: {}", e);
        ChannelConfig::default()
    });

    if let Err(e) = run(&uri, &commands, config).await {
        eprintln!("ftp-channel: {}", e);
        std::process::exit(1);
    }
}

async fn run(uri: &str, commands: &[String], config: ChannelConfig) -> Result<(), ChannelError> {
    info!("Launching control channel to {}", uri);
    let channel = Channel::connect_with(uri, config).await?;

    let welcome = channel.welcome().await?;
    println!("{}", welcome);

    let login = match channel.address().user.clone() {
        Some(user) => {
            let pass = channel.address().password.clone().unwrap_or_default();
            channel.authorize(&user, &pass)
        }
        None => channel.authorize_anonymous(),
    };
    println!("{}", login.await?);

    // Issue everything before waiting on anything.
    let issued: Vec<_> = commands
        .iter()
        .map(|line| {
            let mut parts = line.split_whitespace();
            let verb = parts.next().unwrap_or_default().to_ascii_uppercase();
            let rest: Vec<&str> = parts.collect();
            channel.command(&verb, &rest)
        })
        .collect();
    channel.dump_queue();

    for command in issued {
        match command.await {
            Ok(Some(reply)) => println!("{}", reply),
            Ok(None) => {}
            Err(ChannelError::NegativeReply(reply)) => println!("{}", reply),
            Err(e) => return Err(e),
        }
    }

    for line in commands {
        if let Some(verb) = line.split_whitespace().next() {
            let supported = channel.supports(verb).await?;
            println!("{} supported: {}", verb.to_ascii_uppercase(), supported);
        }
    }

    channel.close();
    Ok(())
}
