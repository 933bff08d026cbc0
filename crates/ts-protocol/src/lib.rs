//! Wire types shared by the ThingSync crates: shadow topics, the shadow
//! request envelope and device report payloads.

pub mod device;
pub mod error;
pub mod shadows;
pub mod topics;

pub use device::*;
pub use error::*;
pub use shadows::*;
pub use topics::{ParsedShadowTopic, ShadowAction, ShadowOutcome, ShadowTopic, parse_shadow_topic};
