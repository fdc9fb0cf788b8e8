use super::NetError;
use std::net::Ipv4Addr;

/// First IPv4 address of an up interface, skipping loopback and link-local
#[cfg(unix)]
pub fn interface_ipv4(name: &str) -> Result<Ipv4Addr, NetError> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;

    let addrs = getifaddrs().map_err(|e| NetError::InterfaceLookup(e.to_string()))?;

    let mut found = false;
    let mut up = false;
    for ifaddr in addrs.filter(|ifaddr| ifaddr.interface_name == name) {
        found = true;
        if !ifaddr.flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        up = true;

        let Some(ip) = ifaddr
            .address
            .as_ref()
            .and_then(|address| address.as_sockaddr_in())
            .map(|sin| sin.ip())
        else {
            continue;
        };
        if ip.is_loopback() || ip.is_link_local() {
            continue;
        }
        return Ok(ip);
    }

    if !found {
        Err(NetError::InterfaceNotFound(name.to_string()))
    } else if !up {
        Err(NetError::InterfaceDown(name.to_string()))
    } else {
        Err(NetError::NoAddress(name.to_string()))
    }
}

#[cfg(not(unix))]
pub fn interface_ipv4(_name: &str) -> Result<Ipv4Addr, NetError> {
    Err(NetError::Unsupported)
}
