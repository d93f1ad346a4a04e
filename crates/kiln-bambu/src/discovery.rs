//! Passive Bambu printer discovery.
//!
//! Bambu printers announce themselves with SSDP NOTIFY packets on UDP port
//! 2021. The listener never sends anything: it binds the announce port,
//! parses whatever arrives, and emits each printer the first time its serial
//! number is seen.

use std::collections::HashSet;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BambuError, Result};

/// UDP port Bambu printers announce on.
pub const DISCOVERY_PORT: u16 = 2021;

const PRINTER_URN: &str = "urn:bambulab-com:device:3dprinter:1";

/// A printer discovered on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BambuDevice {
    /// Printer serial number.
    pub serial: String,
    /// Printer display name.
    pub name: String,
    /// Printer IP address.
    pub ip: String,
    /// Prefix used for this printer's log files.
    pub filename_prefix: String,
}

impl BambuDevice {
    /// Create a device record. The filename prefix defaults to the
    /// lowercased serial number.
    pub fn new(serial: impl Into<String>, name: impl Into<String>, ip: impl Into<String>) -> Self {
        let serial = serial.into();
        let filename_prefix = serial.to_lowercase();
        Self {
            serial,
            name: name.into(),
            ip: ip.into(),
            filename_prefix,
        }
    }
}

/// One parsed SSDP announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Advertisement {
    pub serial: String,
    pub name: Option<String>,
    pub location: Option<String>,
}

/// Parse an SSDP packet into an advertisement, if it is one from a printer.
///
/// Header names are matched case-insensitively. Returns `None` for anything
/// that is not a Bambu printer announcement or is missing the serial.
pub(crate) fn parse_advertisement(packet: &str) -> Option<Advertisement> {
    let mut is_printer = false;
    let mut serial = None;
    let mut name = None;
    let mut location = None;

    for line in packet.lines().skip(1) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("NT") || key.eq_ignore_ascii_case("ST") {
            is_printer = value == PRINTER_URN;
        } else if key.eq_ignore_ascii_case("USN") {
            // USN is either the bare serial or uuid:SERIAL::urn:...
            let value = value.strip_prefix("uuid:").unwrap_or(value);
            let sn = value.split("::").next().unwrap_or(value).trim();
            if !sn.is_empty() {
                serial = Some(sn.to_string());
            }
        } else if key.eq_ignore_ascii_case("Location") {
            location = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("DevName.bambu.com") {
            name = Some(value.to_string());
        }
    }

    if !is_printer {
        return None;
    }
    serial.map(|serial| Advertisement {
        serial,
        name,
        location,
    })
}

/// Turn one packet into a device, tracking seen serials.
///
/// Returns `None` for non-printer packets and for re-announcements of a
/// serial already in `found`.
pub(crate) fn accept_packet(
    found: &mut HashSet<String>,
    packet: &str,
    sender_ip: &str,
) -> Option<BambuDevice> {
    let ad = parse_advertisement(packet)?;
    if found.contains(&ad.serial) {
        debug!("re-announcement from {}, ignoring", ad.serial);
        return None;
    }
    found.insert(ad.serial.clone());
    let ip = ad.location.unwrap_or_else(|| sender_ip.to_string());
    let name = ad.name.unwrap_or_else(|| ad.serial.clone());
    Some(BambuDevice::new(ad.serial, name, ip))
}

/// Bind the announce port with address reuse, so the listener coexists with
/// other SSDP consumers on the host (slicers listen on the same port).
fn bind_announce_socket(port: u16) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Listen for printer announcements and emit each new printer once.
///
/// Runs until cancelled. Re-announcements of a known serial are ignored,
/// including ones that carry a changed address: a printer is handed off
/// exactly once per run. A full output queue drops the device with a
/// warning rather than blocking the receive loop.
///
/// Binding the announce port fails the call outright; a later socket read
/// error is returned as [`BambuError::DiscoveryError`].
pub async fn discover_devices(
    queue: mpsc::Sender<BambuDevice>,
    token: CancellationToken,
) -> Result<()> {
    let socket = bind_announce_socket(DISCOVERY_PORT)
        .and_then(UdpSocket::from_std)
        .map_err(|e| BambuError::DiscoveryError(format!("bind port {DISCOVERY_PORT}: {e}")))?;
    info!("discovery listening on udp/{DISCOVERY_PORT}");

    let mut found: HashSet<String> = HashSet::new();
    let mut buf = [0u8; 2048];

    loop {
        let (len, addr) = tokio::select! {
            _ = token.cancelled() => {
                info!("discovery stopped");
                return Ok(());
            }
            recv = socket.recv_from(&mut buf) => {
                recv.map_err(|e| BambuError::DiscoveryError(e.to_string()))?
            }
        };

        let Ok(packet) = std::str::from_utf8(&buf[..len]) else {
            debug!("ignoring non-utf8 packet from {addr}");
            continue;
        };
        let Some(device) = accept_packet(&mut found, packet, &addr.ip().to_string()) else {
            continue;
        };
        info!("found printer {} ({}) at {}", device.name, device.serial, device.ip);

        match queue.try_send(device) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(device)) => {
                warn!("discovery queue full, dropping {}", device.serial);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                info!("discovery queue closed, stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNOUNCE: &str = "NOTIFY * HTTP/1.1\r\n\
        HOST: 239.255.255.250:2021\r\n\
        NT: urn:bambulab-com:device:3dprinter:1\r\n\
        USN: 00M00A2B012345\r\n\
        Location: 192.168.1.100\r\n\
        DevName.bambu.com: My Printer\r\n\
        DevModel.bambu.com: X1C\r\n\r\n";

    #[test]
    fn test_parse_announcement() {
        let ad = parse_advertisement(ANNOUNCE).unwrap();
        assert_eq!(ad.serial, "00M00A2B012345");
        assert_eq!(ad.name.as_deref(), Some("My Printer"));
        assert_eq!(ad.location.as_deref(), Some("192.168.1.100"));
    }

    #[test]
    fn test_parse_uuid_usn() {
        let packet = "HTTP/1.1 200 OK\r\n\
            ST: urn:bambulab-com:device:3dprinter:1\r\n\
            USN: uuid:00M00A2B012345::urn:bambulab-com:device:3dprinter:1\r\n\r\n";
        let ad = parse_advertisement(packet).unwrap();
        assert_eq!(ad.serial, "00M00A2B012345");
        assert_eq!(ad.name, None);
    }

    #[test]
    fn test_parse_case_insensitive_headers() {
        let packet = "NOTIFY * HTTP/1.1\r\n\
            nt: urn:bambulab-com:device:3dprinter:1\r\n\
            usn: ABC123\r\n\
            location: 10.0.0.5\r\n\r\n";
        let ad = parse_advertisement(packet).unwrap();
        assert_eq!(ad.serial, "ABC123");
        assert_eq!(ad.location.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_parse_rejects_non_printer() {
        let packet = "NOTIFY * HTTP/1.1\r\n\
            NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
            USN: uuid:whatever\r\n\r\n";
        assert!(parse_advertisement(packet).is_none());
    }

    #[test]
    fn test_parse_rejects_missing_serial() {
        let packet = "NOTIFY * HTTP/1.1\r\n\
            NT: urn:bambulab-com:device:3dprinter:1\r\n\r\n";
        assert!(parse_advertisement(packet).is_none());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_advertisement("not an ssdp packet").is_none());
        assert!(parse_advertisement("").is_none());
    }

    #[test]
    fn test_device_filename_prefix() {
        let device = BambuDevice::new("00M00A2B", "P1", "10.0.0.2");
        assert_eq!(device.filename_prefix, "00m00a2b");
    }

    #[test]
    fn test_duplicate_announcements_emit_once() {
        let mut found = HashSet::new();
        let first = accept_packet(&mut found, ANNOUNCE, "192.168.1.100");
        assert_eq!(first.unwrap().serial, "00M00A2B012345");
        assert!(accept_packet(&mut found, ANNOUNCE, "192.168.1.100").is_none());
        assert!(accept_packet(&mut found, ANNOUNCE, "192.168.1.100").is_none());
    }

    #[test]
    fn test_address_change_does_not_reemit() {
        let mut found = HashSet::new();
        assert!(accept_packet(&mut found, ANNOUNCE, "192.168.1.100").is_some());
        let moved = ANNOUNCE.replace("192.168.1.100", "192.168.1.200");
        assert!(accept_packet(&mut found, &moved, "192.168.1.200").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_announce_socket_shares_port() {
        // An SSDP consumer already on the port must not break startup.
        let first = bind_announce_socket(0).unwrap();
        let port = first.local_addr().unwrap().port();
        let second = bind_announce_socket(port).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[test]
    fn test_sender_ip_fallback() {
        let packet = "NOTIFY * HTTP/1.1\r\n\
            NT: urn:bambulab-com:device:3dprinter:1\r\n\
            USN: ABC123\r\n\r\n";
        let mut found = HashSet::new();
        let device = accept_packet(&mut found, packet, "10.1.2.3").unwrap();
        assert_eq!(device.ip, "10.1.2.3");
        assert_eq!(device.name, "ABC123");
    }
}
