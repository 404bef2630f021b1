// # hostname.if Rendering
//
// Turns a descriptor into one line of an OpenBSD hostname.if(5) file.
//
// | family | prefix      | line                                  |
// |--------|-------------|---------------------------------------|
// | v4     | != 32       | `inet <addr> <dotted-mask>`           |
// | v6     | != 128      | `inet6 <addr> <prefix>`               |
// | v4     | 32          | `inet alias <addr> 255.255.255.255`   |
// | v6     | 128         | `inet6 alias <addr> 128`              |

use super::cidr::{AddressFamily, Cidr};

/// Which kind of line a descriptor renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// An address that is a member of a larger subnet
    SubnetMember,
    /// A single-host address (/32 or /128)
    HostAlias,
}

/// Classify a descriptor as subnet member or host alias
pub fn classify(cidr: &Cidr) -> LineKind {
    if cidr.is_host() {
        LineKind::HostAlias
    } else {
        LineKind::SubnetMember
    }
}

/// Render one hostname.if directive
pub fn render_line(cidr: &Cidr) -> String {
    let address = cidr.address();
    match (cidr.family(), classify(cidr)) {
        (AddressFamily::V4, LineKind::SubnetMember) => {
            format!("inet {} {}", address, cidr.netmask())
        }
        (AddressFamily::V6, LineKind::SubnetMember) => {
            format!("inet6 {} {}", address, cidr.prefix_len())
        }
        (AddressFamily::V4, LineKind::HostAlias) => {
            format!("inet alias {} 255.255.255.255", address)
        }
        (AddressFamily::V6, LineKind::HostAlias) => format!("inet6 alias {} 128", address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(literal: &str) -> String {
        render_line(&Cidr::parse(literal).unwrap())
    }

    #[test]
    fn test_ipv4_subnet_member() {
        assert_eq!(line("192.168.1.10/24"), "inet 192.168.1.10 255.255.255.0");
        assert_eq!(line("10.1.2.3/8"), "inet 10.1.2.3 255.0.0.0");
        assert_eq!(line("172.16.5.4/20"), "inet 172.16.5.4 255.255.240.0");
        assert_eq!(line("192.0.2.1/31"), "inet 192.0.2.1 255.255.255.254");
    }

    #[test]
    fn test_ipv4_mask_for_every_prefix() {
        for prefix in 0u8..32 {
            let rendered = line(&format!("10.0.0.1/{}", prefix));
            let mask = rendered.rsplit(' ').next().unwrap();
            let mask: std::net::Ipv4Addr = mask.parse().unwrap();
            assert_eq!(u32::from(mask).count_ones(), prefix as u32, "{}", rendered);
            assert_eq!(u32::from(mask).leading_ones(), prefix as u32, "{}", rendered);
            assert!(rendered.starts_with("inet 10.0.0.1 "));
        }
    }

    #[test]
    fn test_ipv6_subnet_member() {
        assert_eq!(line("2001:db8::1/64"), "inet6 2001:db8::1 64");
    }

    #[test]
    fn test_host_aliases() {
        assert_eq!(line("10.0.0.5/32"), "inet alias 10.0.0.5 255.255.255.255");
        assert_eq!(line("2001:db8::5/128"), "inet6 alias 2001:db8::5 128");
        assert_eq!(
            classify(&Cidr::parse("10.0.0.5/32").unwrap()),
            LineKind::HostAlias
        );
        assert_eq!(
            classify(&Cidr::parse("2001:db8::5/127").unwrap()),
            LineKind::SubnetMember
        );
    }
}
