//! Ethernet addresses of forwarder locators and service functions.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ethernet address, serialized as `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The address as the 48-bit integer an ARP responder loads into the
    /// sender hardware address field.
    pub fn to_u64(&self) -> u64 {
        self.0.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", octet)?;
        }
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMacAddress(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_and_display() {
        let mac: MacAddress = "02:AB:00:00:00:0c".parse().unwrap();
        assert_eq!(mac.octets(), [0x02, 0xab, 0, 0, 0, 0x0c]);
        assert_eq!(mac.to_string(), "02:ab:00:00:00:0c");
    }

    #[test]
    fn test_malformed_rejected() {
        for bad in ["", "02:00:00:00:00", "02:00:00:00:00:00:01", "2:00:00:00:00:01", "zz:00:00:00:00:01"] {
            assert!(bad.parse::<MacAddress>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_to_u64() {
        let mac = MacAddress::new([0x02, 0, 0, 0, 0x01, 0xff]);
        assert_eq!(mac.to_u64(), 0x0200_0000_01ff);
    }

    #[test]
    fn test_serde_as_string() {
        let mac = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"02:00:00:00:00:01\"");
        assert_eq!(serde_json::from_str::<MacAddress>(&json).unwrap(), mac);
    }
}
