//! XBRL data model and taxonomy access.
pub mod instance;
pub mod registry;
pub mod types;

pub use instance::{standard_input_instance, standard_output_instance, Instance};
pub use registry::{arcroles, kinds, ArcProvider, ArcQuery, Relationship, Resource, ResourceRegistry};
pub use types::{Context, DimensionValue, Entity, Fact, Period, Precision, QName, XbrlUnit};
