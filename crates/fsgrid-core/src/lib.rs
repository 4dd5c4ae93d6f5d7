pub mod config;
pub mod constraint;
pub mod error;
pub mod expr;
pub mod offer;
pub mod period;
pub mod range;
pub mod status;
pub mod strings;
pub mod version;

pub use config::{SchedulerConfig, StorageUri};
pub use constraint::Constraint;
pub use error::{CoreError, CoreResult};
pub use offer::{Attribute, Offer, Resource, ResourceValue};
pub use period::Period;
pub use range::Range;
pub use status::{MasterInfo, StatusKind, TaskState, TaskStatus};
