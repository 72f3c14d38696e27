use log::error;
use timetable_solver::server;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = match server::bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid TIMETABLE_ADDR: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = server::run_server(addr).await {
        error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}
