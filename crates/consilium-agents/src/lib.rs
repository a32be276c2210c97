//! Consilium Agents - Catalog, complexity scoring, agent selection and worker instructions

pub mod catalog;
pub mod complexity;
pub mod instruction;
pub mod selection;

pub use catalog::{keywords_match, AgentCatalog};
pub use complexity::{ComplexityScorer, DimensionWeights, ScoringConfig, UrgencyMultipliers, WorkerStep};
pub use instruction::{InstructionBuilder, InstructionConfig, REQUIRED_OUTPUT_FIELDS};
pub use selection::{SelectionConfig, SelectionPolicy, SelectionRequest};
