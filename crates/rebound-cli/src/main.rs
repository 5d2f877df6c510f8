mod cli;

use crate::cli::{CliCommand, Interrupted};

#[tokio::main]
async fn main() {
    if let Err(err) = CliCommand::run_from_args().await {
        if err.downcast_ref::<Interrupted>().is_some() {
            eprintln!("rebound: interrupted");
            std::process::exit(130);
        }
        eprintln!("rebound error: {:#}", err);
        std::process::exit(1);
    }
}
