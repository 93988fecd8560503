use std::env;

#[tokio::main]
async fn main() {
    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = gbwm::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("solve") => {
            if let Err(e) = gbwm::api::run_cli_solve(&raw_args[2..]) {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: cargo run -- serve [port]");
            eprintln!("       cargo run -- solve [--goal-amount N --horizon-years N ...]");
            std::process::exit(1);
        }
    }
}
