//! webscale-probe: dataset probe for web replicas.
//!
//! Each web replica serves `GET /admin/datasets-info` on its admin port
//! and answers with a JSON document such as
//!
//! ```text
//! {"numDataSets": 3, "lastTimeAccess": "2024-05-02T10:11:12Z"}
//! ```
//!
//! A replica holding zero datasets is safe to remove. `HttpDatasetProbe`
//! implements `webscale_engine::DatasetProbe`: every failure (connect,
//! timeout, non-2xx, malformed body) is logged and reported as `None`,
//! which the engine treats as "busy".

pub mod datasets;
pub mod error;

pub use datasets::{DatasetsInfo, HttpDatasetProbe, DEFAULT_PROBE_PATH, DEFAULT_PROBE_PORT};
pub use error::{ProbeError, ProbeResult};
