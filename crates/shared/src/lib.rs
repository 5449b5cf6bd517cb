pub mod baseline;
pub mod biomarker;
pub mod daily;
pub mod errors;
pub mod forecast;
pub mod ids;
pub mod insight;
pub mod labjob;
pub mod lifeevent;
pub mod measurement;
pub mod scores;
pub mod sleep;
pub mod vendor;

pub use errors::{CoreError, CoreResult};
pub use ids::{BiomarkerId, JobId, MeasurementId, SessionId, UserId};
