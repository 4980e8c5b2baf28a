// # Local IP Detector
//
// Finds the host's address without leaving the machine.
//
// ## Strategies
//
// - **Named interface**: the first usable address of the requested family on
//   that interface, read over rtnetlink (Linux only)
// - **Outbound route**: the source address the kernel picks for a route to a
//   public resolver. A UDP socket is connected, which selects the route
//   without sending a packet.
//
// ## Usable addresses
//
// Loopback, link-local, unspecified and multicast addresses are never
// returned. On hosts behind NAT the interface address is private and the
// HTTP detector is the right choice instead.

use dnsync_core::config::DetectionConfig;
use dnsync_core::traits::{IpDetector, IpDetectorFactory};
use dnsync_core::{AddressFamily, Error, ProviderRegistry, Result};

use std::net::{IpAddr, SocketAddr};

/// Well-known anycast targets used only to select a route
const ROUTE_PROBE_V4: &str = "1.1.1.1:53";
const ROUTE_PROBE_V6: &str = "[2606:4700:4700::1111]:53";

/// Detector that inspects local interfaces
#[derive(Debug, Clone)]
pub struct LocalDetector {
    /// Interface to read; `None` uses the outbound route
    interface: Option<String>,
}

impl LocalDetector {
    /// Read the first usable address of a named interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            interface: Some(name.into()),
        }
    }

    /// Use the source address of the default outbound route
    pub fn outbound_route() -> Self {
        Self { interface: None }
    }

    async fn from_interface(&self, name: &str, family: AddressFamily) -> Result<IpAddr> {
        let owned = name.to_string();
        let addresses = tokio::task::spawn_blocking(move || interface_addresses(&owned))
            .await
            .map_err(|e| Error::detection(format!("Interface lookup aborted: {}", e)))??;

        if addresses.is_empty() {
            return Err(Error::detection(format!(
                "Interface {} not found or has no addresses",
                name
            )));
        }

        addresses
            .into_iter()
            .find(|ip| family.matches(ip) && is_usable(ip))
            .ok_or_else(|| {
                Error::detection(format!("Interface {} has no usable {} address", name, family))
            })
    }

    async fn from_route(&self, family: AddressFamily) -> Result<IpAddr> {
        let (bind, probe) = match family {
            AddressFamily::Ipv4 => ("0.0.0.0:0", ROUTE_PROBE_V4),
            AddressFamily::Ipv6 => ("[::]:0", ROUTE_PROBE_V6),
        };

        let socket = tokio::net::UdpSocket::bind(bind)
            .await
            .map_err(|e| Error::detection(format!("Failed to open {} socket: {}", family, e)))?;
        socket
            .connect(probe)
            .await
            .map_err(|e| Error::detection(format!("No {} route: {}", family, e)))?;

        let ip = socket.local_addr().map(|addr: SocketAddr| addr.ip())?;
        if !is_usable(&ip) {
            return Err(Error::detection(format!(
                "Outbound {} route has no usable source address ({})",
                family, ip
            )));
        }
        Ok(ip)
    }
}

#[async_trait::async_trait]
impl IpDetector for LocalDetector {
    async fn detect(&self, family: AddressFamily) -> Result<IpAddr> {
        match &self.interface {
            Some(name) => self.from_interface(name, family).await,
            None => self.from_route(family).await,
        }
    }

    fn method(&self) -> &'static str {
        "interface"
    }
}

/// Whether `ip` can be published
pub fn is_usable(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !v4.is_link_local() && !v4.is_broadcast(),
        IpAddr::V6(v6) => !v6.is_unicast_link_local(),
    }
}

/// All addresses assigned to `name`, read over rtnetlink
#[cfg(target_os = "linux")]
fn interface_addresses(name: &str) -> Result<Vec<IpAddr>> {
    use netlink_packet_route::{AddressMessage, LinkMessage, RtnlMessage};
    use netlink_packet_route::{address, link};

    let socket = rtnl::open()?;

    let mut index = None;
    rtnl::dump(&socket, RtnlMessage::GetLink(LinkMessage::default()), |message| {
        if let RtnlMessage::NewLink(link) = message {
            let matches = link
                .nlas
                .iter()
                .any(|nla| matches!(nla, link::nlas::Nla::IfName(ifname) if ifname == name));
            if matches {
                index = Some(link.header.index);
            }
        }
    })?;

    let Some(index) = index else {
        return Ok(Vec::new());
    };

    let mut addresses = Vec::new();
    rtnl::dump(&socket, RtnlMessage::GetAddress(AddressMessage::default()), |message| {
        if let RtnlMessage::NewAddress(entry) = message {
            if entry.header.index != index {
                return;
            }
            // IFA_LOCAL is the interface's own address on point-to-point links
            let local = entry.nlas.iter().find_map(|nla| match nla {
                address::nlas::Nla::Local(bytes) => rtnl::to_ip(bytes),
                _ => None,
            });
            let ip = local.or_else(|| {
                entry.nlas.iter().find_map(|nla| match nla {
                    address::nlas::Nla::Address(bytes) => rtnl::to_ip(bytes),
                    _ => None,
                })
            });
            addresses.extend(ip);
        }
    })?;

    Ok(addresses)
}

#[cfg(target_os = "linux")]
mod rtnl {
    use dnsync_core::{Error, Result};
    use netlink_packet_core::{
        NLM_F_DUMP, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload,
    };
    use netlink_packet_route::RtnlMessage;
    use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    const RECV_BUFFER: usize = 64 * 1024;

    pub(super) fn open() -> Result<Socket> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;
        Ok(socket)
    }

    /// Send a dump request and feed every reply to `on_message` until the kernel is done
    pub(super) fn dump<F>(socket: &Socket, request: RtnlMessage, mut on_message: F) -> Result<()>
    where
        F: FnMut(RtnlMessage),
    {
        let mut header = NetlinkHeader::default();
        header.flags = NLM_F_DUMP | NLM_F_REQUEST;
        let mut packet = NetlinkMessage::new(header, NetlinkPayload::from(request));
        packet.finalize();

        let mut out = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut out);
        socket.send(&out, 0)?;

        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            let received = socket.recv(&mut &mut buf[..], 0)?;
            let mut offset = 0;
            while offset < received {
                let reply = NetlinkMessage::<RtnlMessage>::deserialize(&buf[offset..received])
                    .map_err(|e| Error::detection(format!("Malformed netlink reply: {}", e)))?;
                let length = reply.header.length as usize;

                match reply.payload {
                    NetlinkPayload::Done(_) => return Ok(()),
                    NetlinkPayload::Error(err) => {
                        return Err(Error::detection(format!("Netlink request failed: {:?}", err)));
                    }
                    NetlinkPayload::InnerMessage(message) => on_message(message),
                    _ => {}
                }

                if length == 0 {
                    return Err(Error::detection("Netlink reply with zero length"));
                }
                offset += length;
            }
        }
    }

    pub(super) fn to_ip(bytes: &[u8]) -> Option<IpAddr> {
        match bytes.len() {
            4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
            16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
            _ => None,
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn interface_addresses(_name: &str) -> Result<Vec<IpAddr>> {
    Err(Error::unsupported(
        "Interface inspection is only available on Linux; use the outbound route or HTTP detection",
    ))
}

/// Factory for creating local detectors
pub struct LocalDetectorFactory;

impl IpDetectorFactory for LocalDetectorFactory {
    fn create(&self, config: &DetectionConfig) -> Result<Box<dyn IpDetector>> {
        match config {
            DetectionConfig::Interface { name: Some(name) } => {
                Ok(Box::new(LocalDetector::interface(name.clone())))
            }
            DetectionConfig::Interface { name: None } => {
                Ok(Box::new(LocalDetector::outbound_route()))
            }
            _ => Err(Error::config("Invalid config for interface detector")),
        }
    }
}

/// Register the local detector with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_detector("interface", Box::new(LocalDetectorFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_usable_filter() {
        assert!(is_usable(&ip("203.0.113.5")));
        assert!(is_usable(&ip("192.168.1.10")));
        assert!(is_usable(&ip("2001:db8::5")));

        assert!(!is_usable(&ip("127.0.0.1")));
        assert!(!is_usable(&ip("169.254.10.1")));
        assert!(!is_usable(&ip("0.0.0.0")));
        assert!(!is_usable(&ip("224.0.0.1")));
        assert!(!is_usable(&ip("::1")));
        assert!(!is_usable(&ip("fe80::1")));
        assert!(!is_usable(&ip("ff02::1")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_netlink_address_bytes() {
        assert_eq!(rtnl::to_ip(&[203, 0, 113, 5]), Some(ip("203.0.113.5")));
        let v6: [u8; 16] = "2001:db8::5".parse::<std::net::Ipv6Addr>().unwrap().octets();
        assert_eq!(rtnl::to_ip(&v6), Some(ip("2001:db8::5")));
        assert_eq!(rtnl::to_ip(&[1, 2, 3]), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_loopback_interface_is_enumerated() {
        let addresses = tokio::task::spawn_blocking(|| interface_addresses("lo"))
            .await
            .unwrap()
            .unwrap();
        assert!(addresses.iter().any(|a| a.is_loopback()));
    }

    #[cfg(not(target_os = "linux"))]
    #[tokio::test]
    async fn test_interface_unsupported_off_linux() {
        let detector = LocalDetector::interface("eth0");
        let err = detector.detect(AddressFamily::Ipv4).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_unknown_interface_is_detection_failure() {
        let detector = LocalDetector::interface("dnsync-test-none0");
        let err = tokio_test::assert_err!(detector.detect(AddressFamily::Ipv4).await);
        assert!(matches!(err, Error::DetectionFailed(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_loopback_interface_has_nothing_usable() {
        let detector = LocalDetector::interface("lo");
        let err = detector.detect(AddressFamily::Ipv4).await.unwrap_err();
        assert!(err.to_string().contains("no usable"));
    }

    #[test]
    fn test_factory() {
        let factory = LocalDetectorFactory;
        let named = factory
            .create(&DetectionConfig::Interface {
                name: Some("eth0".to_string()),
            })
            .unwrap();
        assert_eq!(named.method(), "interface");

        assert!(factory.create(&DetectionConfig::default()).is_err());
    }
}
