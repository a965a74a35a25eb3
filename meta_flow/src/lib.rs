//! Secure median of standard errors for meta-analysis of GWAS summary statistics.
//!
//! Each site reads its study file, encodes the standard-error column as fixed-point integers
//! and submits it to a two-party secure environment. The environment combines both sites'
//! contributions, sorts them obliviously and discloses the median to the configured party.

pub mod encoding;
pub mod error;
pub mod events;
pub mod median;
pub mod role;
pub mod study;

pub use encoding::{EncodedValue, EncodingError, FixedPoint, RangeError, SeFormat};
pub use error::ProtocolError;
pub use events::{EventSink, ProtocolEvent, TracingSink};
pub use median::oblivious_median;
pub use role::{Disclosure, PreparedInput, ProtocolRole, Role, RoleConfig, RoleState};
pub use study::{StudyError, StudyReader, VariantRecord};
