use std::path::PathBuf;
use std::process;

use clap::Parser;

use jackc::driver;

#[derive(Parser)]
#[command(
    name = "jackc",
    version,
    about = "Jack compiler — translates .jack sources to Hack VM code"
)]
struct Cli {
    /// Input .jack file, or directory whose top-level .jack files are compiled
    input: PathBuf,
    /// Run the full pipeline but write no .vm output
    #[arg(long)]
    check: bool,
}

fn main() {
    let cli = Cli::parse();

    let summary = match driver::run(&cli.input, cli.check) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    if summary.failed > 0 {
        eprintln!(
            "{} of {} files failed",
            summary.failed,
            summary.compiled + summary.failed
        );
        process::exit(1);
    }
}
