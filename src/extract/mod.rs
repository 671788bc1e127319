//! Module extractors
//!
//! Two independent ways of turning one module into graph nodes: parsing its
//! source ([`StaticExtractor`]) or importing it ([`Inspector`]).

pub mod inspector;
pub mod visitor;

pub use inspector::{build_module, InspectedKind, InspectedMember, InspectedModule, Inspector, PythonInspector};
pub use visitor::StaticExtractor;
