use vigil::cli::{print_error, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_or_exit();

    if let Err(e) = cli.execute().await {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
