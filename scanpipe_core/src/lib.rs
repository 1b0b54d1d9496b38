pub mod config;
pub mod exporter;
pub mod feeder;
pub mod fetcher;
pub mod mask;
pub mod xml;

pub use config::{ExportSettings, ScanpipeConfig};
pub use exporter::{ExportSession, Exporter, ExporterError};
pub use feeder::{ConfigurationError, Feeder, FeederConfiguration, FeederError, RandomFeeder};
pub use fetcher::{FetcherRegistry, FetcherValue, IP_FETCHER, RegistryError, ResultRow};
pub use mask::{AddressRange, MaskError, OctetPolicy};
pub use xml::XmlExporter;
