//! Subscribe-only MQTT telemetry from Bambu printers.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Packet, QoS, TlsConfiguration, Transport,
};
use tracing::{debug, warn};

use crate::discovery::BambuDevice;
use crate::error::{BambuError, Result};
use crate::report::{BambuStatusReport, ReportCache};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A read-only subscription to one printer's report topic.
///
/// The subscription never publishes anything to the printer. On connection
/// loss it rides the client's reconnect cycle and restores the subscription
/// when the broker accepts again; only a rejected access code is fatal.
pub struct BambuMqttSubscription {
    serial: String,
    client: AsyncClient,
    event_loop: EventLoop,
    cache: ReportCache,
    report_topic: String,
}

impl BambuMqttSubscription {
    /// Connect to a printer and subscribe to its report topic.
    pub async fn connect(device: &BambuDevice, access_code: &str) -> Result<Self> {
        let client_id = format!("kiln_{}", uuid::Uuid::new_v4());

        let mut options = MqttOptions::new(&client_id, &device.ip, 8883);
        options.set_credentials("bblp", access_code);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        // Printers present a self-signed certificate.
        let tls_config = TlsConfiguration::Simple {
            ca: vec![],
            alpn: None,
            client_auth: None,
        };
        options.set_transport(Transport::tls_with_config(tls_config));

        let (client, event_loop) = AsyncClient::new(options, 100);

        let mut subscription = Self {
            serial: device.serial.clone(),
            client,
            event_loop,
            cache: ReportCache::new(),
            report_topic: format!("device/{}/report", device.serial),
        };
        subscription.wait_for_connection().await?;
        subscription.subscribe().await?;
        Ok(subscription)
    }

    async fn wait_for_connection(&mut self) -> Result<()> {
        let start = std::time::Instant::now();

        loop {
            if start.elapsed() > CONNECT_TIMEOUT {
                return Err(BambuError::Timeout("connection timeout".into()));
            }

            match tokio::time::timeout(Duration::from_millis(500), self.event_loop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => return check_conn_ack(&ack),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) if is_auth_error(&e) => {
                    return Err(BambuError::AuthenticationFailed(e.to_string()));
                }
                Ok(Err(e)) => {
                    return Err(BambuError::ConnectionFailed(e.to_string()));
                }
                Err(_) => continue, // Poll timeout, keep waiting
            }
        }
    }

    async fn subscribe(&mut self) -> Result<()> {
        self.client
            .subscribe(&self.report_topic, QoS::AtMostOnce)
            .await
            .map_err(|e| BambuError::MqttError(e.to_string()))?;
        Ok(())
    }

    /// Wait for the next full status snapshot.
    ///
    /// Decode errors on individual payloads are logged and skipped. Transport
    /// errors other than a credential rejection are logged and followed by a
    /// reconnect attempt; the pending subscription is restored on the next
    /// accepted connection.
    pub async fn next_report(&mut self) -> Result<BambuStatusReport> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != self.report_topic {
                        continue;
                    }
                    match self.cache.apply_payload(&publish.payload) {
                        Ok(Some(report)) => return Ok(report),
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("{}: undecodable report payload: {e}", self.serial);
                            continue;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    check_conn_ack(&ack)?;
                    debug!("{}: reconnected, restoring subscription", self.serial);
                    self.subscribe().await?;
                }
                Ok(_) => continue,
                Err(e) if is_auth_error(&e) => {
                    return Err(BambuError::AuthenticationFailed(e.to_string()));
                }
                Err(e) => {
                    warn!("{}: MQTT transport error: {e}, reconnecting", self.serial);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Disconnect from the printer.
    pub async fn shutdown(self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("{}: disconnect: {e}", self.serial);
        }
    }

    /// The printer serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

fn check_conn_ack(ack: &ConnAck) -> Result<()> {
    match ack.code {
        ConnectReturnCode::Success => Ok(()),
        code => Err(BambuError::AuthenticationFailed(format!(
            "broker refused connection: {code:?}"
        ))),
    }
}

fn is_auth_error(error: &ConnectionError) -> bool {
    matches!(
        error,
        ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized
        )
    )
}
