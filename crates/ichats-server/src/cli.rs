use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ichats-server", about = "iChats realtime messaging and call signaling server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/ichats.toml")]
    pub config: String,
}
