//! Query layer: term resolution, condition and meta-condition parsing,
//! pushdown planning, in-memory evaluation and output shaping

pub mod condition;
pub mod meta;
pub mod planner;
pub mod predicate;
pub mod shaping;
pub mod term;

pub use condition::{Condition, parse_condition, parse_conditions, stringify};
pub use meta::{Direction, MetaConditions, MetaName, OrderBy, PostOperation, parse_meta_conditions};
pub use planner::{QueryPlan, is_pushdown_eligible};
pub use predicate::Predicate;
pub use term::{Accessor, ResolveMode, Term, TermCache};
