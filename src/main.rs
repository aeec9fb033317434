use carrot_relay::configuration;
use carrot_relay::relay::Relay;
use carrot_relay::telemetry::init_subscriber;

#[tokio::main]
async fn main() {
    let settings = match configuration::load() {
        Ok(settings) => settings,
        Err(e) => {
            init_subscriber("info");
            tracing::error!(error = ?e, "Failed to load the relay configuration");
            std::process::exit(1);
        }
    };
    init_subscriber(&settings.log_level);

    if let Err(e) = Relay::new(settings).run_until_signal().await {
        tracing::error!(error = ?e, "Relay stopped with an error");
        std::process::exit(1);
    }
}
