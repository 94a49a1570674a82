//! Relay Address Guard
//!
//! With `RELAY_BLOCK_PRIVATE_ADDRESSES` enabled, relay URLs must resolve only to
//! public addresses. The first verified address is pinned on the request client.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// A relay host and the public address it is pinned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedTarget {
    pub host: String,
    pub addr: SocketAddr,
}

/// Whether `ip` is globally routable.
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => {
                let head = v6.segments()[0];
                let unique_local = head & 0xfe00 == 0xfc00;
                let link_local = head & 0xffc0 == 0xfe80;
                !(v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() || unique_local || link_local)
            }
        },
    }
}

fn is_public_v4(v4: Ipv4Addr) -> bool {
    let [a, b, ..] = v4.octets();
    // 100.64.0.0/10
    let carrier_nat = a == 100 && (64..128).contains(&b);
    !(v4.is_private()
        || v4.is_loopback()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
        || v4.is_multicast()
        || v4.is_documentation()
        || carrier_nat
        || a >= 240)
}

/// Resolve the relay URL's host and pin it, refusing any non-public address.
pub async fn pin_public_target(url: &str) -> Result<PinnedTarget, String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid relay URL: {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| "relay URL has no host".to_string())?
        .trim_matches(['[', ']'])
        .to_string();
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| format!("relay URL {url} has no port"))?;

    let addrs: Vec<SocketAddr> = match host.parse::<IpAddr>() {
        Ok(ip) => vec![SocketAddr::new(ip, port)],
        Err(_) => tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| format!("cannot resolve {host}: {e}"))?
            .collect(),
    };

    if let Some(addr) = addrs.iter().find(|addr| !is_public(addr.ip())) {
        return Err(format!("{host} resolves to non-public address {}", addr.ip()));
    }

    let addr = *addrs
        .first()
        .ok_or_else(|| format!("{host} resolved to no addresses"))?;
    Ok(PinnedTarget { host, addr })
}
