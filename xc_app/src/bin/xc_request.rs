use tracing::Level;
use tracing::error;
use tracing::info;
use xc_app::cli;
use xc_app::tracing_setup;
use xc_http::RequestExecutor;
use xc_http::load_settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _guard = match std::env::var("XC_LOG_DIR") {
        Ok(log_dir) => tracing_setup::init_with_file("xc_request", &log_dir, Level::INFO),
        Err(_) => {
            tracing_setup::init(Level::WARN);
            None
        }
    };

    let args = cli::parse_request_args(std::env::args().skip(1))?;
    let settings = load_settings(args.config.as_deref())?;
    let client = RequestExecutor::from_settings(&settings)?;
    info!(base_url = %client.base_url(), retry_count = client.retry_count(), "Client ready");

    let response = client.request::<serde_json::Value, _>(args.method.clone(), &args.path, args.body.as_ref()).await;

    match response {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            error!(method = %args.method, path = %args.path, "Request failed: {err}");
            Err(err.into())
        }
    }
}
