pub mod classifier;

pub use classifier::{classify, decide, BlockDecision, ParseError, RuleSet};
