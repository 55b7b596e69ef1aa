//! celonis-mcp binary entry point.

use celonis_mcp::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    cli::init_tracing(cli.verbose);

    match cli::run(cli).await {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{result}"),
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
