use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Label of the fetcher whose value identifies the scanned host.
pub const IP_FETCHER: &str = "fetcher.ip";

/// Errors raised while building a registry or a row against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The fetcher list does not contain the address-producing fetcher.
    #[error("Fetcher list does not contain the mandatory 'fetcher.ip' fetcher")]
    MissingAddressFetcher,

    /// A row was built with a different number of values than there are fetchers.
    #[error("Row has {found} values but {expected} fetchers are registered")]
    RowLength { expected: usize, found: usize },

    /// A row was built without a value in the address slot.
    #[error("Row has no value for 'fetcher.ip' at position {index}")]
    MissingAddressValue { index: usize },
}

/// One value produced by a fetcher for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherValue {
    Address(IpAddr),
    Text(String),
    Integer(i64),
    Duration(Duration),
}

impl fmt::Display for FetcherValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetcherValue::Address(addr) => write!(f, "{addr}"),
            FetcherValue::Text(text) => f.write_str(text),
            FetcherValue::Integer(value) => write!(f, "{value}"),
            FetcherValue::Duration(elapsed) => write!(f, "{} ms", elapsed.as_millis()),
        }
    }
}

impl From<IpAddr> for FetcherValue {
    fn from(addr: IpAddr) -> Self {
        FetcherValue::Address(addr)
    }
}

impl From<Ipv4Addr> for FetcherValue {
    fn from(addr: Ipv4Addr) -> Self {
        FetcherValue::Address(IpAddr::V4(addr))
    }
}

impl From<String> for FetcherValue {
    fn from(text: String) -> Self {
        FetcherValue::Text(text)
    }
}

impl From<&str> for FetcherValue {
    fn from(text: &str) -> Self {
        FetcherValue::Text(text.to_string())
    }
}

impl From<i64> for FetcherValue {
    fn from(value: i64) -> Self {
        FetcherValue::Integer(value)
    }
}

impl From<Duration> for FetcherValue {
    fn from(elapsed: Duration) -> Self {
        FetcherValue::Duration(elapsed)
    }
}

/// The ordered list of fetchers that defines the columns of every row in an
/// export session.
///
/// Names need not be unique; positions are. The position of [`IP_FETCHER`]
/// is resolved once here and reused for every row. Clones share the name
/// list, and every row built here carries it so a session can tell whether
/// a row belongs to its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherRegistry {
    names: Arc<[String]>,
    address_index: usize,
}

impl FetcherRegistry {
    pub fn new<I, S>(names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let address_index = names
            .iter()
            .position(|name| name == IP_FETCHER)
            .ok_or(RegistryError::MissingAddressFetcher)?;
        Ok(Self {
            names: names.into(),
            address_index,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn address_index(&self) -> usize {
        self.address_index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `row` was built against these columns, by this registry, a
    /// clone of it, or one with the same names in the same order.
    pub fn owns(&self, row: &ResultRow) -> bool {
        Arc::ptr_eq(&self.names, &row.names) || self.names == row.names
    }

    /// Builds a row aligned with this registry.
    ///
    /// Fails if `values` has the wrong length or leaves the address slot empty.
    pub fn row(&self, values: Vec<Option<FetcherValue>>) -> Result<ResultRow, RegistryError> {
        if values.len() != self.names.len() {
            return Err(RegistryError::RowLength {
                expected: self.names.len(),
                found: values.len(),
            });
        }
        if values[self.address_index].is_none() {
            return Err(RegistryError::MissingAddressValue {
                index: self.address_index,
            });
        }
        Ok(ResultRow {
            names: Arc::clone(&self.names),
            values,
            address_index: self.address_index,
        })
    }

    /// Builds a row holding only the address; every other slot is absent.
    pub fn address_only_row(&self, addr: impl Into<FetcherValue>) -> ResultRow {
        let mut values = vec![None; self.names.len()];
        values[self.address_index] = Some(addr.into());
        ResultRow {
            names: Arc::clone(&self.names),
            values,
            address_index: self.address_index,
        }
    }
}

/// The values collected for one scanned address, position-aligned with a
/// [`FetcherRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    names: Arc<[String]>,
    values: Vec<Option<FetcherValue>>,
    address_index: usize,
}

impl ResultRow {
    /// The value in the address slot, present by construction.
    pub fn address(&self) -> &FetcherValue {
        self.values[self.address_index]
            .as_ref()
            .unwrap_or_else(|| unreachable!("rows are built with a present address slot"))
    }

    pub fn values(&self) -> &[Option<FetcherValue>] {
        &self.values
    }

    /// Fetcher names of the registry this row was built against.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Present values other than the address, paired with their position.
    pub fn results(&self) -> impl Iterator<Item = (usize, &FetcherValue)> {
        self.values
            .iter()
            .enumerate()
            .filter(move |(index, _)| *index != self.address_index)
            .filter_map(|(index, value)| value.as_ref().map(|value| (index, value)))
    }
}
