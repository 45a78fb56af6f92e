use rand::Rng;
use shared::PORT_RANGE;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

// Pick a pseudo-random port for a new session
pub fn random_port() -> u16 {
    rand::thread_rng().gen_range(PORT_RANGE)
}

// Find the IPv4 address other machines on the network can reach us at.
// Connecting a UDP socket sends nothing; it only makes the OS choose the
// outbound interface, whose address we then read back.
pub fn local_ipv4_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

// Address shown to joining players, falling back to loopback
pub fn advertised_address() -> String {
    local_ipv4_address()
        .unwrap_or(Ipv4Addr::LOCALHOST)
        .to_string()
}
