/*
 * Responsibility
 * - CLI 引数の解釈 (--generate-key)
 * - tokio runtime 起動と app::run() の呼び出し (ロジックは置かない)
 */
use anyhow::Result;
use clap::Parser;

use elastauth::{app, services::crypto};

/// Credential-bridging gateway for Elasticsearch.
#[derive(Parser, Debug)]
#[command(name = "elastauth", version)]
struct Args {
    /// Print a fresh ELASTAUTH_SECRET_KEY value and exit
    #[arg(long)]
    generate_key: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_key {
        println!("{}", crypto::generate_key_hex());
        return Ok(());
    }

    app::run().await
}
