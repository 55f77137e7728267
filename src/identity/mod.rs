/// Device identity resolution
///
/// Maps a client request to a stable device key: the MAC address learned from
/// the gateway's DHCP/ARP tables when possible, otherwise a long-lived opaque
/// token persisted in a cookie.
use std::path::PathBuf;
use tokio::process::Command;
use uuid::Uuid;

/// Cookie carrying the fallback device token.
pub const DEVICE_COOKIE: &str = "device_id";

const FALLBACK_PREFIX: &str = "device:";
const NULL_MAC: &str = "00:00:00:00:00:00";

/// Resolved identity for one request.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Stable key: a MAC address, or `device:<token>` when unresolvable.
    pub device_key: String,
    pub used_fallback_cookie: bool,
    /// Token to persist client-side when a new fallback key was minted.
    pub issued_token: Option<String>,
}

pub struct DeviceResolver {
    lease_paths: Vec<PathBuf>,
}

impl Default for DeviceResolver {
    fn default() -> Self {
        Self {
            lease_paths: vec![
                PathBuf::from("/var/lib/misc/dnsmasq.leases"),
                PathBuf::from("/var/lib/dnsmasq/dnsmasq.leases"),
            ],
        }
    }
}

impl DeviceResolver {
    /// Resolve a request to a device key. MAC lookup is preferred; the cookie
    /// token is reused when present, and a fresh token is minted otherwise.
    pub async fn resolve(&self, ip: Option<&str>, cookie_token: Option<&str>) -> DeviceIdentity {
        if let Some(ip) = ip {
            if let Some(mac) = self.mac_for_ip(ip).await {
                return DeviceIdentity {
                    device_key: mac,
                    used_fallback_cookie: false,
                    issued_token: None,
                };
            }
        }

        match cookie_token {
            Some(token) if !token.is_empty() => DeviceIdentity {
                device_key: format!("{}{}", FALLBACK_PREFIX, token),
                used_fallback_cookie: true,
                issued_token: None,
            },
            _ => {
                let token = Uuid::new_v4().to_string();
                DeviceIdentity {
                    device_key: format!("{}{}", FALLBACK_PREFIX, token),
                    used_fallback_cookie: true,
                    issued_token: Some(token),
                }
            }
        }
    }

    /// Try dnsmasq leases first (most reliable on the gateway), then the
    /// kernel ARP table, then the arp tool.
    pub async fn mac_for_ip(&self, ip: &str) -> Option<String> {
        if let Some(mac) = self.mac_from_dnsmasq(ip).await {
            return Some(mac);
        }
        if let Some(mac) = mac_from_proc_arp(ip).await {
            return Some(mac);
        }
        mac_from_arp_cmd(ip).await
    }

    async fn mac_from_dnsmasq(&self, ip: &str) -> Option<String> {
        for path in &self.lease_paths {
            let Ok(contents) = tokio::fs::read_to_string(path).await else {
                continue;
            };
            if let Some(mac) = parse_dnsmasq_leases(&contents, ip) {
                return Some(mac);
            }
        }
        None
    }
}

/// dnsmasq lease format: <expiry> <mac> <ip> <hostname> <client-id>
fn parse_dnsmasq_leases(contents: &str, ip: &str) -> Option<String> {
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 3 && fields[2] == ip {
            if let Some(mac) = normalize_mac(fields[1]) {
                return Some(mac);
            }
        }
    }
    None
}

async fn mac_from_proc_arp(ip: &str) -> Option<String> {
    let contents = tokio::fs::read_to_string("/proc/net/arp").await.ok()?;
    parse_proc_arp(&contents, ip)
}

fn parse_proc_arp(contents: &str, ip: &str) -> Option<String> {
    // First line is the column header.
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() == Some(&ip) {
            if let Some(mac) = fields.get(3).and_then(|f| normalize_mac(f)) {
                return Some(mac);
            }
        }
    }
    None
}

async fn mac_from_arp_cmd(ip: &str) -> Option<String> {
    for args in [["-n", ip], ["-a", ip]] {
        let Ok(output) = Command::new("arp").args(args).output().await else {
            continue;
        };
        if !output.status.success() {
            continue;
        }
        if let Some(mac) = find_mac_token(&String::from_utf8_lossy(&output.stdout)) {
            return Some(mac);
        }
    }
    None
}

/// First MAC-shaped token in command output.
fn find_mac_token(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .find_map(normalize_mac)
}

/// Lowercased colon-separated MAC, or None for malformed and all-zero
/// addresses.
fn normalize_mac(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split([':', '-']).collect();
    if parts.len() != 6
        || parts
            .iter()
            .any(|p| p.len() != 2 || !p.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }

    let mac = parts.join(":").to_ascii_lowercase();
    if mac == NULL_MAC {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mac_formats() {
        assert_eq!(
            normalize_mac("AA:BB:CC:DD:EE:FF"),
            Some("aa:bb:cc:dd:ee:ff".to_string())
        );
        assert_eq!(
            normalize_mac("aa-bb-cc-dd-ee-ff"),
            Some("aa:bb:cc:dd:ee:ff".to_string())
        );
        assert_eq!(normalize_mac("00:00:00:00:00:00"), None);
        assert_eq!(normalize_mac("not-a-mac"), None);
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee"), None);
    }

    #[test]
    fn parses_dnsmasq_leases() {
        let leases = "1699999999 aa:bb:cc:dd:ee:ff 10.0.0.55 phone 01:aa:bb:cc:dd:ee:ff\n\
                      1699999999 11:22:33:44:55:66 10.0.0.56 laptop *\n";
        assert_eq!(
            parse_dnsmasq_leases(leases, "10.0.0.56"),
            Some("11:22:33:44:55:66".to_string())
        );
        assert_eq!(parse_dnsmasq_leases(leases, "10.0.0.99"), None);
    }

    #[test]
    fn parses_proc_arp() {
        let arp = "IP address       HW type     Flags       HW address            Mask     Device\n\
                   10.0.0.55        0x1         0x2         aa:bb:cc:dd:ee:ff     *        wlan0\n\
                   10.0.0.60        0x1         0x0         00:00:00:00:00:00     *        wlan0\n";
        assert_eq!(
            parse_proc_arp(arp, "10.0.0.55"),
            Some("aa:bb:cc:dd:ee:ff".to_string())
        );
        // Incomplete entries carry the null MAC and resolve to nothing.
        assert_eq!(parse_proc_arp(arp, "10.0.0.60"), None);
        assert_eq!(parse_proc_arp(arp, "10.0.0.99"), None);
    }

    #[test]
    fn finds_mac_token_in_arp_output() {
        let out = "? (10.0.0.55) at aa:bb:cc:dd:ee:ff [ether] on wlan0";
        assert_eq!(find_mac_token(out), Some("aa:bb:cc:dd:ee:ff".to_string()));
        assert_eq!(find_mac_token("no entry for host"), None);
    }

    #[tokio::test]
    async fn fallback_identity_mints_token_once() {
        let resolver = DeviceResolver { lease_paths: vec![] };

        let first = resolver.resolve(None, None).await;
        assert!(first.used_fallback_cookie);
        let token = first.issued_token.clone().expect("fresh token");
        assert_eq!(first.device_key, format!("device:{}", token));

        // Subsequent requests present the cookie and keep the same key.
        let second = resolver.resolve(None, Some(&token)).await;
        assert!(second.used_fallback_cookie);
        assert!(second.issued_token.is_none());
        assert_eq!(second.device_key, first.device_key);
    }
}
