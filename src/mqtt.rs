use anyhow::{bail, Context, Result};
use log::*;
use paho_mqtt as mqtt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use vitocal_lib::{pipeline::Publish, snapshot::Snapshot, Error};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub url: String,
    pub client_id: String,
    /// Appends a random suffix to `client_id`, for running several gateways against one broker.
    pub unique_client_id: bool,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Quality of service code to use
    qos: u8,
    pub tls: Option<TlsConfig>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: String::from("ssl://localhost:8883"),
            client_id: String::from("heatpump"),
            unique_client_id: false,
            topic: String::from("climatico/vitocal"),
            username: None,
            password: None,
            qos: 1,
            tls: None,
        }
    }
}

impl MqttConfig {
    pub fn qos(&self) -> Result<i32> {
        if self.qos > 2 {
            bail!("Invalid MQTT QoS {}, expected 0, 1 or 2", self.qos);
        }
        Ok(self.qos as i32)
    }

    fn client_id(&self) -> String {
        if self.unique_client_id {
            format!("{}-{:04x}", self.client_id, rand::random::<u16>())
        } else {
            self.client_id.clone()
        }
    }

    fn availability_topic(&self) -> String {
        format!("{}/{}", self.topic, MQTT_APPENDIX_AVAILABILITY)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM file with the certificates trusted for the broker.
    pub ca_file: Option<PathBuf>,
    /// Verify the broker certificate.
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_verify() -> bool {
    true
}

const MQTT_APPENDIX_AVAILABILITY: &str = "availability";
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";

/// Publishes snapshots as retained JSON documents.
pub struct MqttPublisher {
    client: mqtt::Client,
    topic: String,
    availability_topic: String,
    qos: i32,
}

impl MqttPublisher {
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        let qos = config.qos()?;
        let availability_topic = config.availability_topic();
        info!("Connecting to MQTT broker {}", config.url);

        let create_opts = mqtt::CreateOptionsBuilder::new()
            .server_uri(config.url.clone())
            .client_id(config.client_id())
            .finalize();
        let mut client =
            mqtt::Client::new(create_opts).with_context(|| "Error creating mqtt client")?;

        // Use 5sec timeouts for sync calls.
        client.set_timeout(Duration::from_secs(5));

        let mut conn_builder = mqtt::ConnectOptionsBuilder::new();
        let mut conn_builder = conn_builder
            .keep_alive_interval(Duration::from_secs(20))
            .clean_session(true)
            .will_message(mqtt::Message::new_retained(
                availability_topic.clone(),
                PAYLOAD_OFFLINE,
                qos,
            ));

        if let Some(user_name) = &config.username {
            conn_builder = conn_builder.user_name(user_name)
        }
        if let Some(password) = &config.password {
            conn_builder = conn_builder.password(password)
        }
        if let Some(tls) = &config.tls {
            let mut ssl_builder = mqtt::SslOptionsBuilder::new();
            if let Some(ca_file) = &tls.ca_file {
                ssl_builder
                    .trust_store(ca_file)
                    .with_context(|| format!("Cannot use trust store {ca_file:?}"))?;
            }
            ssl_builder.enable_server_cert_auth(tls.verify);
            conn_builder = conn_builder.ssl_options(ssl_builder.finalize());
        }
        let conn_ops = conn_builder.finalize();

        client
            .connect(conn_ops)
            .with_context(|| "Mqtt client unable to connect")?;

        let publisher = Self {
            client,
            topic: config.topic.clone(),
            availability_topic,
            qos,
        };
        publisher.go_online()?;
        Ok(publisher)
    }

    fn go_online(&self) -> Result<()> {
        let msg = mqtt::Message::new_retained(&self.availability_topic, PAYLOAD_ONLINE, self.qos);
        self.client
            .publish(msg)
            .with_context(|| "Cannot publish mqtt message")
    }

    pub fn go_offline(&self) -> Result<()> {
        let msg = mqtt::Message::new_retained(&self.availability_topic, PAYLOAD_OFFLINE, self.qos);
        self.client
            .publish(msg)
            .with_context(|| "Cannot publish mqtt message")
    }

    pub fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect(None)
            .with_context(|| "Error disconnect mqtt client")
    }

    /// Re-establishes a dropped broker connection before publishing.
    fn ensure_connected(&self) {
        if self.client.is_connected() {
            return;
        }
        warn!("Connection to MQTT broker was lost, reconnecting");
        match self.client.reconnect() {
            Ok(_) => {
                if let Err(err) = self.go_online() {
                    warn!("{err:#}");
                }
            }
            Err(err) => warn!("Could not reconnect to MQTT broker: {err}"),
        }
    }
}

impl Publish for MqttPublisher {
    fn publish(&mut self, snapshot: &Snapshot) -> vitocal_lib::Result<()> {
        let payload = serde_json::to_string(snapshot).map_err(Error::publish)?;
        self.ensure_connected();
        let msg = mqtt::Message::new_retained(&self.topic, payload, self.qos);
        self.client.publish(msg).map_err(Error::publish)
    }
}
