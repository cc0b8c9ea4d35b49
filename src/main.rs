use clap::Parser;
use ssh_ops::{cli::Cli, config::Config, exit_code, run};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    println!("Target: {}@{}", cli.username, cli.host);

    let outcome = Config::from_cli(&cli).and_then(run);
    match &outcome {
        Ok(0) => println!("\n✅ Completed successfully!\n"),
        Ok(code) => eprintln!("\n⚠️  Finished with exit code {}\n", code),
        Err(e) => eprintln!("\n❌ Operation failed: {:#}\n", e),
    }

    std::process::exit(exit_code(&outcome));
}
