// src/main.rs

use dagsuite::{cli, logging, run};

#[tokio::main]
async fn main() {
    let code = match run_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("dagsuite error: {err:?}");
            1
        }
    };
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
