use console::style;
use s5cmd_runner::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("{} {e}", style("error:").red().bold());
        std::process::exit(cli::exit_code(&e));
    }
}
