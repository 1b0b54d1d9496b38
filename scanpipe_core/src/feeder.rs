use crate::mask::{AddressRange, MaskError};
use rand::rngs::ThreadRng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Separates the fields of a serialized [`FeederConfiguration`].
pub const SERIALIZED_SEPARATOR: &str = ":::";

/// Reasons a feeder configuration is rejected before any address is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The address count must be at least one.
    #[error("address count must be greater than zero")]
    ZeroCount,

    /// The prototype is not a dotted-quad IPv4 address.
    #[error("prototype '{0}' is not a valid IPv4 address")]
    Prototype(String),

    /// The mask could not be turned into four octet policies.
    #[error(transparent)]
    Mask(#[from] MaskError),

    /// A serialized configuration did not have the `prototype:::mask:::count` shape.
    #[error("malformed serialized configuration '{0}'")]
    Malformed(String),
}

/// Errors surfaced by [`Feeder`] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeederError {
    /// The configuration was rejected; the feeder state is unchanged.
    #[error("Invalid feeder configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),

    /// `next_address` was called after all addresses were produced.
    #[error("Feeder exhausted after producing {count} addresses")]
    Exhausted { count: u32 },
}

/// Everything needed to set up a [`RandomFeeder`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields, default)]
pub struct FeederConfiguration {
    pub prototype: Ipv4Addr,
    pub mask: String,
    pub count: u32,
}

impl Default for FeederConfiguration {
    /// Loopback prototype, first octet fixed, 100 addresses.
    fn default() -> Self {
        Self {
            prototype: Ipv4Addr::LOCALHOST,
            mask: "255.0.0.0".to_string(),
            count: 100,
        }
    }
}

impl FeederConfiguration {
    /// Builds a configuration from user-entered text fields.
    pub fn new(prototype: &str, mask: &str, count: u32) -> Result<Self, ConfigurationError> {
        let prototype = prototype
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| ConfigurationError::Prototype(prototype.to_string()))?;
        Ok(Self {
            prototype,
            mask: mask.to_string(),
            count,
        })
    }

    /// Checks the configuration and derives its generation domain.
    pub fn address_range(&self) -> Result<AddressRange, ConfigurationError> {
        if self.count == 0 {
            return Err(ConfigurationError::ZeroCount);
        }
        Ok(AddressRange::parse(self.prototype, &self.mask)?)
    }
}

impl fmt::Display for FeederConfiguration {
    /// Writes the `prototype:::mask:::count` form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.prototype,
            self.mask,
            self.count,
            sep = SERIALIZED_SEPARATOR
        )
    }
}

impl FromStr for FeederConfiguration {
    type Err = ConfigurationError;

    /// Parses the `prototype:::mask:::count` form.
    ///
    /// Only the shape and field syntax are checked here; the mask and the
    /// count are validated by [`FeederConfiguration::address_range`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(SERIALIZED_SEPARATOR).collect();
        let [prototype, mask, count] = parts.as_slice() else {
            return Err(ConfigurationError::Malformed(s.to_string()));
        };

        let count = count
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigurationError::Malformed(s.to_string()))?;

        Self::new(prototype, mask, count)
    }
}

/// A `Feeder` produces the finite sequence of addresses a scan will visit.
///
/// A feeder is consumed by exactly one caller; hand independent copies to
/// parallel workers with [`Feeder::box_clone`].
pub trait Feeder: Send + fmt::Debug {
    /// Label key identifying the feeder kind.
    fn name(&self) -> &'static str;

    /// Returns `true` while more addresses remain.
    fn has_next(&self) -> bool;

    /// Produces the next address.
    ///
    /// Returns `FeederError::Exhausted` once every address has been handed out.
    fn next_address(&mut self) -> Result<Ipv4Addr, FeederError>;

    /// Share of the sequence consumed so far, from 0 to 100.
    fn percentage_complete(&self) -> f64;

    /// Human-readable description of what this feeder generates.
    fn info(&self) -> String;

    /// The `"name: info"` string handed to an exporter when a session starts.
    fn session_info(&self) -> String {
        format!("{}: {}", self.name(), self.info())
    }

    /// Encodes the configuration so the scan setup can be stored and reloaded.
    fn serialize(&self) -> String;

    /// Re-initializes from a string produced by [`Feeder::serialize`].
    ///
    /// On failure the feeder keeps its previous configuration and progress.
    fn restore(&mut self, serialized: &str) -> Result<(), FeederError>;

    /// A copy with the same configuration and fresh generation state.
    fn box_clone(&self) -> Box<dyn Feeder>;
}

impl Clone for Box<dyn Feeder> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Draws `count` addresses at random from the domain described by a
/// prototype address and a per-octet mask.
///
/// Addresses are drawn with replacement, so the same address may repeat.
#[derive(Debug)]
pub struct RandomFeeder {
    config: FeederConfiguration,
    range: AddressRange,
    consumed: u32,
    rng: ChaCha8Rng,
}

impl RandomFeeder {
    /// Creates a feeder seeded from the thread-local generator.
    pub fn new(config: FeederConfiguration) -> Result<Self, FeederError> {
        Self::with_rng(config, fresh_rng())
    }

    /// Creates a feeder whose sequence is reproducible for a given seed.
    pub fn with_seed(config: FeederConfiguration, seed: u64) -> Result<Self, FeederError> {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(config: FeederConfiguration, rng: ChaCha8Rng) -> Result<Self, FeederError> {
        let range = config.address_range()?;
        debug!(%range, count = config.count, mask = %config.mask, "random feeder initialized");
        Ok(Self {
            config,
            range,
            consumed: 0,
            rng,
        })
    }

    /// Replaces the configuration and starts a new sequence.
    ///
    /// The previous state is kept if `config` is invalid.
    pub fn initialize(&mut self, config: FeederConfiguration) -> Result<(), FeederError> {
        let range = config.address_range()?;
        debug!(%range, count = config.count, mask = %config.mask, "random feeder re-initialized");
        self.config = config;
        self.range = range;
        self.consumed = 0;
        Ok(())
    }

    pub fn config(&self) -> &FeederConfiguration {
        &self.config
    }

    pub fn range(&self) -> &AddressRange {
        &self.range
    }

    /// Addresses still to be produced.
    pub fn remaining(&self) -> u32 {
        self.config.count - self.consumed
    }
}

impl Clone for RandomFeeder {
    /// Copies the configuration only; the clone starts from the beginning
    /// of a new sequence with its own generator.
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            range: self.range,
            consumed: 0,
            rng: fresh_rng(),
        }
    }
}

impl Feeder for RandomFeeder {
    fn name(&self) -> &'static str {
        "feeder.random"
    }

    fn has_next(&self) -> bool {
        self.consumed < self.config.count
    }

    fn next_address(&mut self) -> Result<Ipv4Addr, FeederError> {
        if !self.has_next() {
            return Err(FeederError::Exhausted {
                count: self.config.count,
            });
        }
        self.consumed += 1;
        Ok(self.range.draw(&mut self.rng))
    }

    fn percentage_complete(&self) -> f64 {
        f64::from(self.consumed) * 100.0 / f64::from(self.config.count)
    }

    fn info(&self) -> String {
        format!(
            "{} ({}), {} addresses",
            self.range, self.config.mask, self.config.count
        )
    }

    fn serialize(&self) -> String {
        self.config.to_string()
    }

    fn restore(&mut self, serialized: &str) -> Result<(), FeederError> {
        let config = serialized.parse::<FeederConfiguration>()?;
        self.initialize(config)
    }

    fn box_clone(&self) -> Box<dyn Feeder> {
        Box::new(self.clone())
    }
}

impl Iterator for RandomFeeder {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_address().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RandomFeeder {}

fn fresh_rng() -> ChaCha8Rng {
    let mut seed_source: ThreadRng = rand::rng();
    ChaCha8Rng::from_rng(&mut seed_source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::OctetPolicy;
    use std::collections::HashSet;

    fn config(mask: &str, count: u32) -> FeederConfiguration {
        FeederConfiguration::new("10.20.30.40", mask, count).expect("valid prototype")
    }

    #[test]
    fn produces_exactly_count_addresses_with_fixed_octets_kept() {
        for (mask, count) in [("255.255..", 1), ("255...128", 17), ("255..0.255", 250)] {
            let mut feeder = RandomFeeder::with_seed(config(mask, count), 11).unwrap();
            let fixed: Vec<(usize, u8)> = feeder
                .range()
                .policies()
                .iter()
                .enumerate()
                .filter_map(|(i, p)| match p {
                    OctetPolicy::Fixed(v) => Some((i, *v)),
                    OctetPolicy::Random { .. } => None,
                })
                .collect();

            let mut produced = 0;
            while feeder.has_next() {
                let addr = feeder.next_address().unwrap().octets();
                for (i, value) in &fixed {
                    assert_eq!(addr[*i], *value, "mask {mask}: octet {i} must stay fixed");
                }
                produced += 1;
            }
            assert_eq!(produced, count);
            assert_eq!(feeder.percentage_complete(), 100.0);
        }
    }

    #[test]
    fn calling_past_the_end_fails_with_exhausted() {
        let mut feeder = RandomFeeder::with_seed(config("255.255.255.", 3), 1).unwrap();
        for _ in 0..3 {
            feeder.next_address().unwrap();
        }
        assert!(!feeder.has_next());
        assert_eq!(
            feeder.next_address(),
            Err(FeederError::Exhausted { count: 3 })
        );
        assert_eq!(
            feeder.next_address(),
            Err(FeederError::Exhausted { count: 3 })
        );
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert_eq!(
            RandomFeeder::new(config("255...", 0)).unwrap_err(),
            FeederError::InvalidConfiguration(ConfigurationError::ZeroCount)
        );
        assert!(matches!(
            RandomFeeder::new(config("255..", 5)),
            Err(FeederError::InvalidConfiguration(ConfigurationError::Mask(_)))
        ));
        assert_eq!(
            FeederConfiguration::new("10.0.0", "255...", 5),
            Err(ConfigurationError::Prototype("10.0.0".to_string()))
        );
        assert!(FeederConfiguration::new("example.com", "255...", 5).is_err());
    }

    #[test]
    fn failed_initialize_keeps_previous_state() {
        let mut feeder = RandomFeeder::with_seed(config("255.255.255.", 4), 2).unwrap();
        feeder.next_address().unwrap();
        assert!(feeder.initialize(config("not.a.mask.x", 9)).is_err());
        assert_eq!(feeder.config(), &config("255.255.255.", 4));
        assert_eq!(feeder.remaining(), 3);

        feeder.initialize(config("255.255..", 9)).unwrap();
        assert_eq!(feeder.remaining(), 9);
    }

    #[test]
    fn serialize_then_restore_round_trips() {
        for (mask, count) in [("255...128", 100), ("/16", 1), ("0.0.0.0", 100_000)] {
            let original = RandomFeeder::new(config(mask, count)).unwrap();
            let serialized = original.serialize();
            assert_eq!(serialized, format!("10.20.30.40:::{mask}:::{count}"));

            let mut restored = RandomFeeder::new(config("255.255.255.255", 1)).unwrap();
            restored.restore(&serialized).unwrap();
            assert_eq!(restored.config(), original.config());
            assert_eq!(restored.range(), original.range());
            assert_eq!(restored.remaining(), count);
        }
    }

    #[test]
    fn malformed_serialized_strings_fail_restore() {
        let mut feeder = RandomFeeder::with_seed(config("255.255.255.", 4), 5).unwrap();
        for bad in [
            "",
            "10.0.0.1",
            "10.0.0.1:::255...",
            "10.0.0.1:::255...:::abc",
            "10.0.0.1:::255...:::-3",
            "10.0.0.1:::255...:::0",
            "10.0.0.1:::255..:::3",
            "10.0.0:::255...:::3",
            "10.0.0.1:::255...:::3:::extra",
        ] {
            assert!(
                matches!(
                    feeder.restore(bad),
                    Err(FeederError::InvalidConfiguration(_))
                ),
                "restore({bad:?}) should fail"
            );
            assert_eq!(feeder.config(), &config("255.255.255.", 4));
        }
    }

    #[test]
    fn seeded_feeders_are_reproducible() {
        let a: Vec<_> = RandomFeeder::with_seed(config("255...", 20), 99)
            .unwrap()
            .collect();
        let b: Vec<_> = RandomFeeder::with_seed(config("255...", 20), 99)
            .unwrap()
            .collect();
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
    }

    #[test]
    fn clone_starts_a_fresh_sequence_with_same_configuration() {
        let mut feeder = RandomFeeder::with_seed(config("255.255..", 10), 4).unwrap();
        for _ in 0..10 {
            feeder.next_address().unwrap();
        }
        assert!(!feeder.has_next());

        let mut copy = feeder.box_clone();
        assert!(copy.has_next());
        assert_eq!(copy.serialize(), feeder.serialize());
        assert_eq!(copy.percentage_complete(), 0.0);

        let drawn: HashSet<_> = std::iter::from_fn(|| copy.next_address().ok()).collect();
        assert!(!drawn.is_empty());
        assert!(copy.next_address().is_err());
        assert!(drawn
            .iter()
            .all(|addr| addr.octets()[..2] == [10, 20]));
    }

    #[test]
    fn iterator_reports_exact_size() {
        let mut feeder = RandomFeeder::new(config("255.255.255.", 5)).unwrap();
        assert_eq!(feeder.len(), 5);
        feeder.next();
        assert_eq!(feeder.size_hint(), (4, Some(4)));
        assert_eq!(feeder.by_ref().count(), 4);
        assert_eq!(feeder.next(), None);
    }

    #[test]
    fn session_info_names_the_feeder() {
        let feeder = RandomFeeder::new(config("255.255.255.", 256)).unwrap();
        assert_eq!(
            feeder.session_info(),
            "feeder.random: 10.20.30.0 - 10.20.30.255 (255.255.255.), 256 addresses"
        );
    }

    #[test]
    fn percentage_tracks_progress() {
        let mut feeder = RandomFeeder::new(config("255.255.255.", 4)).unwrap();
        assert_eq!(feeder.percentage_complete(), 0.0);
        feeder.next_address().unwrap();
        assert_eq!(feeder.percentage_complete(), 25.0);
    }
}
