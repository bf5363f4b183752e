//! Concrete pipeline steps in execution order.

mod analyze;
mod master;
mod package;
mod premaster;
mod reference;

pub use analyze::AnalyzeStep;
pub use master::{MasterStep, MasterTarget};
pub use package::PackageStep;
pub use premaster::PremasterStep;
pub use reference::ReferenceStep;
