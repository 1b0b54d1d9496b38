use rand::Rng;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Number of octet tokens a dotted mask must contain.
const OCTET_COUNT: usize = 4;

/// Errors produced while turning a mask string into an [`AddressRange`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    /// The mask did not split into exactly four dot-separated tokens.
    #[error("mask '{mask}' has {found} octets, expected 4")]
    OctetCount { mask: String, found: usize },

    /// A token was neither empty nor a byte value.
    #[error("mask octet '{token}' at position {position} is not a value between 0 and 255")]
    InvalidOctet { token: String, position: usize },

    /// A `/N` mask with a prefix length outside `0..=32`.
    #[error("mask prefix '{0}' is not a length between 0 and 32")]
    InvalidPrefix(String),
}

/// How one octet of a generated address is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OctetPolicy {
    /// Always this value, copied from the prototype.
    Fixed(u8),
    /// Bits set in `lo` are kept, bits that differ between `lo` and `hi`
    /// are drawn at random. For netmask-style octets this is uniform over
    /// `lo..=hi`.
    Random { lo: u8, hi: u8 },
}

impl OctetPolicy {
    /// Derives the policy for one octet from its mask token and the
    /// prototype's octet at the same position.
    ///
    /// `255` fixes the octet, an empty token randomizes it fully, and any
    /// other byte keeps the prototype bits set in the mask while the
    /// remaining bits span the random range.
    fn from_token(token: &str, prototype_octet: u8, position: usize) -> Result<Self, MaskError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(OctetPolicy::Random { lo: 0, hi: u8::MAX });
        }

        let mask_bits = token.parse::<u8>().map_err(|_| MaskError::InvalidOctet {
            token: token.to_string(),
            position,
        })?;

        if mask_bits == u8::MAX {
            return Ok(OctetPolicy::Fixed(prototype_octet));
        }

        let lo = prototype_octet & mask_bits;
        Ok(OctetPolicy::Random {
            lo,
            hi: lo | !mask_bits,
        })
    }

    fn lowest(&self) -> u8 {
        match *self {
            OctetPolicy::Fixed(value) => value,
            OctetPolicy::Random { lo, .. } => lo,
        }
    }

    fn highest(&self) -> u8 {
        match *self {
            OctetPolicy::Fixed(value) => value,
            OctetPolicy::Random { hi, .. } => hi,
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        match *self {
            OctetPolicy::Fixed(value) => value,
            OctetPolicy::Random { lo, hi } => lo | (rng.random::<u8>() & (lo ^ hi)),
        }
    }
}

/// The bounded generation domain of a random feeder: one policy per octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    policies: [OctetPolicy; OCTET_COUNT],
}

impl AddressRange {
    /// Parses `mask` against `prototype`.
    ///
    /// Accepts dotted masks (`255..0.0`, `255.255.255.`) and prefix lengths
    /// (`/24`), the latter being expanded to the equivalent dotted form first.
    pub fn parse(prototype: Ipv4Addr, mask: &str) -> Result<Self, MaskError> {
        let mask = mask.trim();
        let dotted = match mask.strip_prefix('/') {
            Some(prefix) => expand_prefix(prefix)?,
            None => mask.to_string(),
        };

        let tokens: Vec<&str> = dotted.split('.').collect();
        if tokens.len() != OCTET_COUNT {
            return Err(MaskError::OctetCount {
                mask: mask.to_string(),
                found: tokens.len(),
            });
        }

        let octets = prototype.octets();
        let mut policies = [OctetPolicy::Fixed(0); OCTET_COUNT];
        for (position, (token, policy)) in tokens.iter().zip(policies.iter_mut()).enumerate() {
            *policy = OctetPolicy::from_token(token, octets[position], position)?;
        }

        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[OctetPolicy; OCTET_COUNT] {
        &self.policies
    }

    /// Smallest address this range can produce.
    pub fn lowest(&self) -> Ipv4Addr {
        let [a, b, c, d] = self.policies.map(|p| p.lowest());
        Ipv4Addr::new(a, b, c, d)
    }

    /// Largest address this range can produce.
    pub fn highest(&self) -> Ipv4Addr {
        let [a, b, c, d] = self.policies.map(|p| p.highest());
        Ipv4Addr::new(a, b, c, d)
    }

    /// Draws one address, each octet independently.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv4Addr {
        let mut octets = [0u8; OCTET_COUNT];
        for (octet, policy) in octets.iter_mut().zip(self.policies.iter()) {
            *octet = policy.draw(rng);
        }
        Ipv4Addr::from(octets)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.lowest(), self.highest())
    }
}

/// Turns the digits of a `/N` mask into a dotted mask string.
fn expand_prefix(prefix: &str) -> Result<String, MaskError> {
    let length = prefix
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|length| *length <= 32)
        .ok_or_else(|| MaskError::InvalidPrefix(prefix.to_string()))?;

    let bits: u32 = if length == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(length))
    };
    Ok(Ipv4Addr::from(bits).to_string())
}
