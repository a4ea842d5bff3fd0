//! Model representations: trees, conditions and rules.

mod condition;
mod rule;
mod tree;

pub use condition::{Condition, ConditionKind, Operator};
pub use rule::{Rule, RuleOrigin, RuleSignature};
#[doc(hidden)]
pub use tree::TreeLiteral;
pub use tree::{
    CategoriesStorage, MutableTree, NodeId, SplitType, Tree, TreeSet, TreeValidationError,
    TreeView, float_to_category,
};
