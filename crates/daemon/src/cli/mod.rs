use clap::{Parser, Subcommand};

pub mod ops;

#[derive(Parser, Debug)]
#[command(name = "varpipe", version, about = "Expose live program variables as files")]
pub struct Args {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "VARPIPE_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Mount a set of demo game variables and update them until Ctrl-C
    Demo(ops::Demo),
}

impl Command {
    pub async fn execute(&self) -> anyhow::Result<()> {
        match self {
            Command::Demo(demo) => demo.execute().await,
        }
    }
}
