//! Link and peer payload validation.

use linkward_registry::{Link, Peer};

use crate::error::{EngineError, Entity, Result};

/// Maximum length of a kernel interface name (`IFNAMSIZ - 1`).
pub const MAX_INTERFACE_NAME_LENGTH: usize = 15;

/// Validate a kernel interface name.
///
/// Interface names must:
/// - Be 1-15 bytes long
/// - Not contain `/`, `:` or whitespace
/// - Not be `.` or `..`
///
/// # Errors
///
/// Returns the reason the name is rejected.
pub fn validate_interface_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if name.len() > MAX_INTERFACE_NAME_LENGTH {
        return Err(format!(
            "name too long: {} > {MAX_INTERFACE_NAME_LENGTH}",
            name.len()
        ));
    }
    if name == "." || name == ".." {
        return Err(format!("name cannot be {name:?}"));
    }
    if let Some(c) = name.chars().find(|c| *c == '/' || *c == ':' || c.is_whitespace()) {
        return Err(format!("invalid character {c:?}"));
    }
    Ok(())
}

/// Validate a link payload: a valid interface name and at least one address.
pub fn validate_link(link: &Link) -> Result<()> {
    validate_interface_name(&link.name)
        .map_err(|reason| EngineError::validation(Entity::Link, &link.name, reason))?;
    if link.address_ipv4.is_none() && link.address_ipv6.is_none() {
        return Err(EngineError::validation(
            Entity::Link,
            &link.name,
            "at least one IPv4 or IPv6 address is required",
        ));
    }
    Ok(())
}

/// Validate a peer payload: a non-empty name.
pub fn validate_peer(peer: &Peer) -> Result<()> {
    if peer.name.is_empty() {
        return Err(EngineError::validation(
            Entity::Peer,
            &peer.name,
            "name cannot be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use linkward_wireguard::{generate_keypair, PrivateKey};
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("wg0" ; "short name")]
    #[test_case("wg-linko" ; "with hyphen")]
    #[test_case("a" ; "single char")]
    #[test_case("abcdefghijklmno" ; "fifteen bytes")]
    #[test_case("wg_0.home" ; "underscore and dot")]
    fn accepts_interface_name(name: &str) {
        assert!(validate_interface_name(name).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("abcdefghijklmnop" ; "sixteen bytes")]
    #[test_case("." ; "dot")]
    #[test_case(".." ; "dot dot")]
    #[test_case("wg/0" ; "slash")]
    #[test_case("wg:0" ; "colon alias")]
    #[test_case("wg 0" ; "space")]
    #[test_case("wg\t0" ; "tab")]
    fn rejects_interface_name(name: &str) {
        assert!(validate_interface_name(name).is_err());
    }

    fn link(name: &str) -> Link {
        Link::new(name, PrivateKey::generate())
    }

    #[test]
    fn link_requires_an_address() {
        let err = validate_link(&link("wg0")).expect_err("no address");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let v4 = link("wg0").with_ipv4("10.6.6.1/24".parse().expect("cidr"));
        assert!(validate_link(&v4).is_ok());
        let v6 = link("wg0").with_ipv6("2001::/32".parse().expect("cidr"));
        assert!(validate_link(&v6).is_ok());
    }

    #[test]
    fn link_requires_a_name() {
        let nameless = link("").with_ipv4("10.6.6.1/24".parse().expect("cidr"));
        assert_eq!(
            validate_link(&nameless).expect_err("empty").kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn peer_requires_a_name() {
        let (_, public) = generate_keypair();
        assert!(validate_peer(&Peer::new("", public)).is_err());
        assert!(validate_peer(&Peer::new("zoz pc", public)).is_ok());
    }

    proptest! {
        #[test]
        fn names_within_ifnamsiz_are_accepted(name in "[a-z0-9_-]{1,15}") {
            prop_assert!(validate_interface_name(&name).is_ok());
        }

        #[test]
        fn names_over_ifnamsiz_are_rejected(name in "[a-z0-9]{16,40}") {
            prop_assert!(validate_interface_name(&name).is_err());
        }
    }
}
