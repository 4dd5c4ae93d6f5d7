//! fsgrid-placement: turning a resource offer into a placed node.
//!
//! # Components
//!
//! - **`reserve`**: Reservation engine (scalars, lowest-first port allocation)
//! - **`admission`**: Admission predicate (`matches`) and the `ClusterView` it reads
//! - **`runtime`**: Committing a placement (`init_runtime`, filesystem URI)

pub mod admission;
pub mod error;
pub mod reserve;
pub mod runtime;

pub use admission::{ClusterView, NamenodeStatus, matches};
pub use error::{PlacementError, PlacementResult};
pub use reserve::{reserve, reserve_port};
pub use runtime::{fs_uri, init_runtime};
