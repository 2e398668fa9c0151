use serde::{Deserialize, Serialize};

/// The JSON document the language model is asked to return.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProblemSet {
    #[serde(default)]
    pub problems: Vec<Problem>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Problem {
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub answer: String,
}
