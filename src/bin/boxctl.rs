//! Presence event injection tool
//!
//! Publishes one of the recognized presence payloads to the box topic so a
//! full experiment cycle can be exercised without the sensor hardware.
//!
//! Usage:
//!   cargo run --bin boxctl -- enter
//!   cargo run --bin boxctl -- exit --config config/dev.toml

use chickenbox::infra::Config;
use clap::{Parser, ValueEnum};
use rumqttc::{AsyncClient, Event as MqttEvent, MqttOptions, Packet, QoS};
use std::time::Duration;

const ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Signal {
    /// Subject entered the box
    Enter,
    /// Subject left the box
    Exit,
}

impl Signal {
    fn payload(self) -> &'static str {
        match self {
            Signal::Enter => "chicken_detected_in_box",
            Signal::Exit => "chicken_exited_box",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "boxctl", about = "Inject presence events into a running chicken box")]
struct Args {
    /// Which presence event to publish
    #[arg(value_enum)]
    signal: Signal,

    /// Config file path (broker endpoint and topic are read from it)
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let client_id = format!("boxctl-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqtt_options.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqtt_options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

    let payload = args.signal.payload();
    client.publish(config.mqtt_topic(), QoS::AtLeastOnce, false, payload).await?;

    // The publish above only queues the message; poll the event loop until
    // the broker acknowledges it. Any connection error before that is fatal.
    let acked = tokio::time::timeout(ACK_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(MqttEvent::Incoming(Packet::PubAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    })
    .await;

    match acked {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(format!("publish failed: {}", e).into()),
        Err(_) => return Err("timed out waiting for broker acknowledgment".into()),
    }

    client.disconnect().await?;
    println!(
        "{} -> {} @ {}:{}",
        payload,
        config.mqtt_topic(),
        config.mqtt_host(),
        config.mqtt_port()
    );

    Ok(())
}
