//! Roaming Core Library
//!
//! Value types shared by the roaming adapter and the entity model of an
//! e-mobility roaming network: identifiers, timestamped status values, the
//! minimal entity shapes pushed to roaming partners, change records, charge
//! detail records and push outcomes.

pub mod ids;
pub mod status;
pub mod entities;
pub mod updates;
pub mod cdr;
pub mod result;

pub use ids::*;
pub use status::*;
pub use entities::*;
pub use updates::*;
pub use cdr::ChargeDetailRecord;
pub use result::{PushOutcome, PushResult, Warning};
