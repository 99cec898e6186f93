// src/main.rs

use devloop::{cli, logging, run};

#[tokio::main]
async fn main() {
    let code = match run_main().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("devloop error: {err:?}");
            1
        }
    };
    // Exit directly: the blocking stdin reader would otherwise hold the
    // runtime open until the next line arrives.
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await?;
    Ok(())
}
