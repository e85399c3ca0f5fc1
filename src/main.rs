use clap::Parser;
use echem_processor::CyclerError;
use echem_processor::cli::{self, Args};
use std::process;

fn main() {
    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = cli::run(args) => result.map(|_| ()),
            _ = shutdown_signal() => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(CyclerError::processing_interrupted("Processing interrupted by user").into())
            }
        }
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Resolves on Ctrl-C; never resolves if no handler can be installed
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
