//! Curve25519 keys for links and peers.
//!
//! A key is 32 raw bytes. Operators, the registry and `wg` all see it as
//! standard base64.

use crate::error::WireGuardError;
use base64::Engine;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Length of every key in raw bytes.
pub const KEY_SIZE: usize = 32;

fn decode_key(s: &str) -> Result<[u8; KEY_SIZE], WireGuardError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(s.trim())?;
    if bytes.len() != KEY_SIZE {
        return Err(WireGuardError::InvalidKeyLength(bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn encode_key(bytes: &[u8; KEY_SIZE]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Implements base64 string conversions and serde for a key newtype.
macro_rules! base64_key {
    ($ty:ident) => {
        impl $ty {
            /// Creates the key from a byte slice.
            ///
            /// # Errors
            ///
            /// Returns an error if the slice is not exactly 32 bytes.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireGuardError> {
                if bytes.len() != KEY_SIZE {
                    return Err(WireGuardError::InvalidKeyLength(bytes.len()));
                }
                let mut arr = [0u8; KEY_SIZE];
                arr.copy_from_slice(bytes);
                Ok(Self(arr))
            }

            /// Creates the key from a 32-byte array.
            #[must_use]
            pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes of the key.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }

            /// Encodes the key as base64.
            #[must_use]
            pub fn to_base64(&self) -> String {
                encode_key(&self.0)
            }

            /// Decodes the key from base64.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is not valid base64 or wrong length.
            pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
                decode_key(s).map(Self)
            }
        }

        impl FromStr for $ty {
            type Err = WireGuardError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_base64(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_base64(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// The public half of a link or peer identity.
///
/// Peers are keyed by it in the device table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_SIZE]);

base64_key!(PublicKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_base64()).finish()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(point: X25519PublicKey) -> Self {
        Self(point.to_bytes())
    }
}

/// Equality for secrets that does not short-circuit on the first
/// differing byte.
macro_rules! secret_eq {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0.ct_eq(&other.0).into()
            }
        }

        impl Eq for $ty {}
    };
}

/// A link's static secret. Never printed.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

base64_key!(PrivateKey);
secret_eq!(PrivateKey);

impl PrivateKey {
    /// Draws a fresh secret from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    /// Computes the public key `wg pubkey` would print for this secret.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        X25519PublicKey::from(&StaticSecret::from(self.0)).into()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Optional symmetric secret mixed into a peer's handshake.
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

base64_key!(PresharedKey);
secret_eq!(PresharedKey);

impl PresharedKey {
    /// Fills a new key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PresharedKey(<redacted>)")
    }
}

/// Returns a fresh private key together with its public key.
#[must_use]
pub fn generate_keypair() -> (PrivateKey, PublicKey) {
    let secret = PrivateKey::generate();
    let public = secret.public_key();
    (secret, public)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_matches_derivation() {
        let (secret, public) = generate_keypair();
        assert_eq!(secret.public_key(), public);
        assert_ne!(PrivateKey::generate().public_key(), public);
    }

    #[test]
    fn parses_wg_formatted_key() {
        let key: PublicKey = "ZOZ+ngJZ2jf+sREdOi/b0D8rTGMbcjgSA854Jn2KbzQ="
            .parse()
            .expect("valid key");
        assert_eq!(key.to_string(), "ZOZ+ngJZ2jf+sREdOi/b0D8rTGMbcjgSA854Jn2KbzQ=");
    }

    #[test]
    fn known_private_key_derives_known_public_key() {
        // RFC 7748 section 6.1 test vector (Alice).
        let private = PrivateKey::from_bytes_array([
            0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2,
            0x66, 0x45, 0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5,
            0x1d, 0xb9, 0x2c, 0x2a,
        ]);
        let expected = PublicKey::from_bytes_array([
            0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e,
            0xf7, 0x5a, 0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e,
            0xaa, 0x9b, 0x4e, 0x6a,
        ]);
        assert_eq!(private.public_key(), expected);
    }

    #[test]
    fn secrets_are_not_printed() {
        let secret = PrivateKey::generate();
        let shown = format!("{secret:?}");
        assert_eq!(shown, "PrivateKey(<redacted>)");
        assert!(!shown.contains(&secret.to_base64()));

        let psk = PresharedKey::generate();
        assert_eq!(format!("{psk:?}"), "PresharedKey(<redacted>)");
    }

    #[test]
    fn private_key_serializes_as_base64_string() {
        let private = PrivateKey::from_bytes_array([7u8; KEY_SIZE]);
        let json = serde_json::to_string(&private).expect("serialize");
        assert_eq!(json, format!("\"{}\"", private.to_base64()));
        let back: PrivateKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, private);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(PrivateKey::from_bytes(&[0u8; 16]).is_err());
        assert!(PublicKey::from_bytes(&[1u8; 33]).is_err());
        assert!(matches!(
            "AAAA".parse::<PublicKey>(),
            Err(WireGuardError::InvalidKeyLength(3))
        ));
    }

    #[test]
    fn invalid_base64_rejected() {
        assert!(matches!(
            "not base64!".parse::<PresharedKey>(),
            Err(WireGuardError::InvalidBase64(_))
        ));
    }

    #[test]
    fn garbage_json_key_rejected() {
        let result: Result<PublicKey, _> = serde_json::from_str("\"x\"");
        assert!(result.is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn public_key_string_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
                let public = PublicKey::from_bytes_array(bytes);
                let decoded = public.to_string().parse::<PublicKey>();
                prop_assert_eq!(Ok(public), decoded);
            }

            #[test]
            fn preshared_key_serde_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
                let psk = PresharedKey::from_bytes_array(bytes);
                let json = serde_json::to_string(&psk).expect("serialize");
                let back: PresharedKey = serde_json::from_str(&json).expect("deserialize");
                prop_assert_eq!(psk, back);
            }

            #[test]
            fn private_key_base64_roundtrip(seed: [u8; 32]) {
                let secret = PrivateKey::from_bytes_array(seed);
                let back = PrivateKey::from_base64(&secret.to_base64());
                prop_assert_eq!(Ok(secret), back);
            }
        }
    }
}
