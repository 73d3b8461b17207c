#[tokio::main]
async fn main() {
    let code = gogo_cli::run_cli_process().await;
    std::process::exit(code);
}
