//! Classic tabular estimators
//!
//! Serialized as a tagged document, e.g.
//!
//! ```json
//! {"estimator": "logistic_regression",
//!  "coef": [[0.5, -1.0, 0.25]], "intercept": [0.1], "classes": [0, 1]}
//! ```

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A class label as stored by the training library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Label {
    pub fn to_json(&self) -> Value {
        match self {
            Label::Int(v) => Value::from(*v),
            Label::Float(v) => Value::from(*v),
            Label::Text(v) => Value::from(v.as_str()),
        }
    }
}

/// Output of a tabular estimator
#[derive(Debug, Clone, PartialEq)]
pub enum TabularOutput {
    /// Regression values, one per row
    Values(Vec<f64>),
    /// Class labels, one per row
    Labels(Vec<Label>),
}

/// Ordinary least squares style linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coef: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

/// Linear classifier with one decision row per class (or one row for binary)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    pub classes: Vec<Label>,
}

/// Binary decision tree in flat array form.
///
/// Node `i` is a leaf when `children_left[i] == -1`; otherwise rows with
/// `x[feature[i]] <= threshold[i]` go left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per node: `[value]` for regression, class weights for classification
    pub value: Vec<Vec<f64>>,
    /// Present for classifiers
    #[serde(default)]
    pub classes: Option<Vec<Label>>,
    #[serde(default)]
    pub n_features_in: Option<usize>,
}

/// Any supported tabular estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "estimator", rename_all = "snake_case")]
pub enum TabularModel {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTree),
}

impl TabularModel {
    /// Number of input columns the estimator expects, when known
    pub fn n_features(&self) -> Option<usize> {
        match self {
            TabularModel::LinearRegression(m) => Some(m.coef.len()),
            TabularModel::LogisticRegression(m) => m.coef.first().map(Vec::len),
            TabularModel::DecisionTree(m) => m.n_features_in,
        }
    }

    /// Structural checks run once at load time
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TabularModel::LinearRegression(m) => {
                if m.coef.is_empty() {
                    return Err("linear_regression has no coefficients".into());
                }
            }
            TabularModel::LogisticRegression(m) => m.validate()?,
            TabularModel::DecisionTree(m) => m.validate()?,
        }
        Ok(())
    }

    /// Predict one output per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<TabularOutput, String> {
        if let Some(expected) = self.n_features() {
            if x.ncols() != expected {
                return Err(format!(
                    "X has {} features, but the model is expecting {} features as input",
                    x.ncols(),
                    expected
                ));
            }
        }

        match self {
            TabularModel::LinearRegression(m) => Ok(TabularOutput::Values(
                x.rows()
                    .into_iter()
                    .map(|row| dot(row, &m.coef) + m.intercept)
                    .collect(),
            )),
            TabularModel::LogisticRegression(m) => Ok(TabularOutput::Labels(
                x.rows().into_iter().map(|row| m.classify(row)).collect(),
            )),
            TabularModel::DecisionTree(m) => m.predict(x),
        }
    }
}

impl LogisticRegression {
    fn validate(&self) -> Result<(), String> {
        if self.coef.is_empty() || self.coef.len() != self.intercept.len() {
            return Err(format!(
                "logistic_regression has {} coefficient rows but {} intercepts",
                self.coef.len(),
                self.intercept.len()
            ));
        }
        let width = self.coef[0].len();
        if width == 0 || self.coef.iter().any(|row| row.len() != width) {
            return Err("logistic_regression coefficient rows differ in length".into());
        }
        let expected_classes = if self.coef.len() == 1 { 2 } else { self.coef.len() };
        if self.classes.len() != expected_classes {
            return Err(format!(
                "logistic_regression expects {} classes, found {}",
                expected_classes,
                self.classes.len()
            ));
        }
        Ok(())
    }

    fn classify(&self, row: ArrayView1<'_, f64>) -> Label {
        let scores: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(coef, b)| dot(row, coef) + b)
            .collect();

        let index = if scores.len() == 1 {
            usize::from(scores[0] > 0.0)
        } else {
            argmax(&scores)
        };
        self.classes[index].clone()
    }
}

impl DecisionTree {
    fn validate(&self) -> Result<(), String> {
        let n = self.children_left.len();
        if n == 0 {
            return Err("decision_tree has no nodes".into());
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ]
        .iter()
        .any(|len| *len != n)
        {
            return Err("decision_tree node arrays differ in length".into());
        }
        if matches!(&self.classes, Some(classes) if classes.is_empty()) {
            return Err("decision_tree has an empty class list".into());
        }

        for i in 0..n {
            let (left, right) = (self.children_left[i], self.children_right[i]);
            if left == -1 {
                let leaf = &self.value[i];
                if leaf.is_empty() {
                    return Err(format!("leaf {} has no value", i));
                }
                if let Some(classes) = &self.classes {
                    if leaf.len() != classes.len() {
                        return Err(format!(
                            "leaf {} has {} class weights for {} classes",
                            i,
                            leaf.len(),
                            classes.len()
                        ));
                    }
                }
                continue;
            }
            let in_range = |c: i64| c > i as i64 && (c as usize) < n;
            if !in_range(left) || !in_range(right) {
                return Err(format!("node {} has out-of-order children", i));
            }
            if self.feature[i] < 0 {
                return Err(format!("node {} splits on a negative feature index", i));
            }
        }
        Ok(())
    }

    fn leaf(&self, row: ArrayView1<'_, f64>) -> Result<&[f64], String> {
        let mut node = 0usize;
        // children always point forward, so this terminates
        while self.children_left[node] != -1 {
            let feature = self.feature[node] as usize;
            let value = *row
                .get(feature)
                .ok_or_else(|| format!("split on feature {} but X has {}", feature, row.len()))?;
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        Ok(&self.value[node])
    }

    fn predict(&self, x: &Array2<f64>) -> Result<TabularOutput, String> {
        match &self.classes {
            Some(classes) => x
                .rows()
                .into_iter()
                .map(|row| Ok(classes[argmax(self.leaf(row)?)].clone()))
                .collect::<Result<Vec<_>, String>>()
                .map(TabularOutput::Labels),
            None => x
                .rows()
                .into_iter()
                .map(|row| Ok(self.leaf(row)?[0]))
                .collect::<Result<Vec<_>, String>>()
                .map(TabularOutput::Values),
        }
    }
}

fn dot(row: ArrayView1<'_, f64>, coef: &[f64]) -> f64 {
    row.iter().zip(coef).map(|(x, w)| x * w).sum()
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
