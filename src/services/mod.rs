pub mod config;
pub mod probe;
pub mod provider;

pub use config::{ConfigService, GeneralConfigLine};
pub use probe::{ProbeService, TestResult, TimingBreakdown};
pub use provider::{LivePreview, ProviderService, StatusReport};
