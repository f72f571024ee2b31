//! FILENAME: engine/src/config.rs
//! PURPOSE: Resource limits applied while parsing and evaluating formulas.
//! CONTEXT: Formulas come from game data files, so a malformed or hostile one
//! must not be able to blow the stack or spin on a huge dice roll. Hosts can
//! load these limits from their own configuration through serde; missing
//! fields fall back to the defaults.

use formula_parser::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum nesting of groups, operands, arguments and string
    /// substitutions. A flat chain like `1 + 1 + 1` counts once, however
    /// long it is.
    pub max_parse_depth: usize,
    /// Maximum recursion depth of the evaluator. Chains nest to the right,
    /// so here every extra term of `1 + 1 + 1` is one more level.
    pub max_eval_depth: usize,
    /// Largest dice count accepted by `N d M`.
    pub max_dice_rolls: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_parse_depth: DEFAULT_MAX_DEPTH,
            max_eval_depth: 512,
            max_dice_rolls: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let limits: Limits = serde_json::from_str(r#"{"max_dice_rolls": 20}"#).unwrap();
        assert_eq!(limits.max_dice_rolls, 20);
        assert_eq!(limits.max_parse_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(limits.max_eval_depth, 512);
    }
}
