//! Gradient-boosted tree ensembles
//!
//! Reads the XGBoost JSON model format (`Booster.save_model("model.json")`)
//! into a compact [`Booster`] and evaluates it over a [`DMatrix`].

use ndarray::{Array2, ArrayView1};
use serde::Deserialize;

/// Dense feature matrix; NaN marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct DMatrix {
    data: Array2<f32>,
}

impl DMatrix {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn from_f64(data: &Array2<f64>) -> Self {
        Self::new(data.mapv(|v| v as f32))
    }

    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }
}

/// Output transform applied to the summed margin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    /// Raw margin (regression, ranking, `binary:logitraw`)
    Identity,
    /// Sigmoid probability
    Logistic,
    /// Exponential (count and positive-valued regression)
    Exp,
    /// 0/1 by sign of the margin
    Hinge,
    /// Per-class probabilities
    Softprob,
    /// Index of the most likely class
    Softmax,
}

impl ObjectiveKind {
    pub fn from_name(name: &str) -> Result<Self, String> {
        let kind = match name {
            "binary:logistic" | "reg:logistic" => ObjectiveKind::Logistic,
            "count:poisson" | "reg:gamma" | "reg:tweedie" | "survival:cox" => ObjectiveKind::Exp,
            "binary:hinge" => ObjectiveKind::Hinge,
            "multi:softprob" => ObjectiveKind::Softprob,
            "multi:softmax" => ObjectiveKind::Softmax,
            "binary:logitraw" => ObjectiveKind::Identity,
            n if n.starts_with("reg:") || n.starts_with("rank:") => ObjectiveKind::Identity,
            other => return Err(format!("unsupported objective '{}'", other)),
        };
        Ok(kind)
    }

    /// Convert the user-facing `base_score` into a margin
    fn base_margin(&self, base_score: f32) -> f32 {
        match self {
            ObjectiveKind::Logistic if base_score > 0.0 && base_score < 1.0 => {
                (base_score / (1.0 - base_score)).ln()
            }
            ObjectiveKind::Exp if base_score > 0.0 => base_score.ln(),
            _ => base_score,
        }
    }
}

/// Prediction of a booster over a matrix
#[derive(Debug, Clone, PartialEq)]
pub enum BoostedPrediction {
    /// One value per row
    Vector(Vec<f32>),
    /// One row of per-group values per input row
    Matrix(Array2<f32>),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: u32,
    right: u32,
    feature: u32,
    /// Split threshold, or the leaf value for leaves
    value: f32,
    default_left: bool,
    is_leaf: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf_value(&self, row: ArrayView1<'_, f32>) -> Result<f32, String> {
        let mut node = &self.nodes[0];
        while !node.is_leaf {
            let fvalue = *row.get(node.feature as usize).ok_or_else(|| {
                format!(
                    "split on feature {} but the matrix has {} columns",
                    node.feature,
                    row.len()
                )
            })?;
            let go_left = if fvalue.is_nan() {
                node.default_left
            } else {
                fvalue < node.value
            };
            node = &self.nodes[if go_left { node.left } else { node.right } as usize];
        }
        Ok(node.value)
    }
}

/// Tree ensemble with its objective
#[derive(Debug, Clone)]
pub struct Booster {
    trees: Vec<Tree>,
    tree_groups: Vec<usize>,
    tree_weights: Option<Vec<f32>>,
    num_groups: usize,
    num_features: Option<usize>,
    base_margin: f32,
    objective: ObjectiveKind,
    objective_name: String,
}

impl Booster {
    /// Parse an XGBoost JSON model document
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: ModelFile =
            serde_json::from_str(json).map_err(|e| format!("not an XGBoost JSON model: {}", e))?;
        Self::from_model_file(file)
    }

    pub fn objective(&self) -> &str {
        &self.objective_name
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_features(&self) -> Option<usize> {
        self.num_features
    }

    fn from_model_file(file: ModelFile) -> Result<Self, String> {
        let learner = file.learner;
        let params = learner.learner_model_param;

        let objective_name = learner.objective.name;
        let objective = ObjectiveKind::from_name(&objective_name)?;

        let base_score = parse_param(&params.base_score, "base_score")?;
        let num_class = parse_count(&params.num_class, "num_class")?;
        let num_feature = parse_count(&params.num_feature, "num_feature")?;
        let num_groups = num_class.max(1);

        let (model, tree_weights) = match learner.gradient_booster {
            GradientBooster::Gbtree { model } => (model, None),
            GradientBooster::Dart {
                gbtree,
                weight_drop,
            } => (gbtree.model, Some(weight_drop)),
        };

        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.into_tree().map_err(|e| format!("tree {}: {}", i, e)))
            .collect::<Result<Vec<_>, String>>()?;

        let tree_groups = if model.tree_info.is_empty() {
            vec![0; trees.len()]
        } else {
            model.tree_info
        };
        if tree_groups.len() != trees.len() {
            return Err(format!(
                "tree_info has {} entries for {} trees",
                tree_groups.len(),
                trees.len()
            ));
        }
        if let Some(group) = tree_groups.iter().find(|g| **g >= num_groups) {
            return Err(format!(
                "tree assigned to group {} but the model has {} groups",
                group, num_groups
            ));
        }
        if let Some(weights) = &tree_weights {
            if weights.len() != trees.len() {
                return Err(format!(
                    "weight_drop has {} entries for {} trees",
                    weights.len(),
                    trees.len()
                ));
            }
        }
        if num_feature > 0 {
            let widest = trees
                .iter()
                .flat_map(|t| t.nodes.iter())
                .filter(|n| !n.is_leaf)
                .map(|n| n.feature as usize)
                .max();
            if let Some(feature) = widest.filter(|f| *f >= num_feature) {
                return Err(format!(
                    "split on feature {} but num_feature is {}",
                    feature, num_feature
                ));
            }
        }

        Ok(Self {
            trees,
            tree_groups,
            tree_weights,
            num_groups,
            num_features: (num_feature > 0).then_some(num_feature),
            base_margin: objective.base_margin(base_score),
            objective,
            objective_name,
        })
    }

    /// Summed margins, shape `(rows, groups)`
    pub fn predict_margin(&self, matrix: &DMatrix) -> Result<Array2<f32>, String> {
        if let Some(expected) = self.num_features {
            if matrix.num_cols() != expected {
                return Err(format!(
                    "Feature shape mismatch, expected: {}, got {}",
                    expected,
                    matrix.num_cols()
                ));
            }
        }

        let mut margins = Array2::from_elem((matrix.num_rows(), self.num_groups), self.base_margin);
        for (r, row) in matrix.data().rows().into_iter().enumerate() {
            for (t, tree) in self.trees.iter().enumerate() {
                let weight = self.tree_weights.as_ref().map_or(1.0, |w| w[t]);
                margins[[r, self.tree_groups[t]]] += weight * tree.leaf_value(row)?;
            }
        }
        Ok(margins)
    }

    /// Predictions after the objective transform
    pub fn predict(&self, matrix: &DMatrix) -> Result<BoostedPrediction, String> {
        let mut margins = self.predict_margin(matrix)?;

        let prediction = match self.objective {
            ObjectiveKind::Softprob => {
                margins.rows_mut().into_iter().for_each(|mut row| {
                    let max = row.fold(f32::NEG_INFINITY, |a, b| a.max(*b));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                });
                BoostedPrediction::Matrix(margins)
            }
            ObjectiveKind::Softmax => BoostedPrediction::Vector(
                margins
                    .rows()
                    .into_iter()
                    .map(|row| {
                        let mut best = 0;
                        for (i, v) in row.iter().enumerate() {
                            if *v > row[best] {
                                best = i;
                            }
                        }
                        best as f32
                    })
                    .collect(),
            ),
            kind => {
                margins.mapv_inplace(|m| match kind {
                    ObjectiveKind::Logistic => 1.0 / (1.0 + (-m).exp()),
                    ObjectiveKind::Exp => m.exp(),
                    ObjectiveKind::Hinge => {
                        if m > 0.0 {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    _ => m,
                });
                if self.num_groups == 1 {
                    BoostedPrediction::Vector(margins.column(0).to_vec())
                } else {
                    BoostedPrediction::Matrix(margins)
                }
            }
        };
        Ok(prediction)
    }
}

fn parse_param(raw: &str, name: &str) -> Result<f32, String> {
    // XGBoost >= 2.0 writes vector-valued parameters such as "[5E-1]"
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let first = trimmed.split(',').next().unwrap_or("").trim();
    first
        .parse()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

fn parse_count(raw: &str, name: &str) -> Result<usize, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

// XGBoost JSON schema (the parts prediction needs)

#[derive(Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Deserialize)]
struct Learner {
    learner_model_param: LearnerModelParam,
    objective: Objective,
    gradient_booster: GradientBooster,
}

#[derive(Deserialize)]
struct LearnerModelParam {
    base_score: String,
    #[serde(default)]
    num_class: String,
    #[serde(default)]
    num_feature: String,
}

#[derive(Deserialize)]
struct Objective {
    name: String,
}

#[derive(Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
enum GradientBooster {
    Gbtree {
        model: TreeModel,
    },
    Dart {
        gbtree: DartTrees,
        weight_drop: Vec<f32>,
    },
}

#[derive(Deserialize)]
struct DartTrees {
    model: TreeModel,
}

#[derive(Deserialize)]
struct TreeModel {
    trees: Vec<JsonTree>,
    #[serde(default)]
    tree_info: Vec<usize>,
}

/// `default_left` is written as 0/1 by some versions and as booleans by others
#[derive(Deserialize, Clone, Copy)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[derive(Deserialize)]
struct JsonTree {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<u8>,
}

impl JsonTree {
    fn into_tree(self) -> Result<Tree, String> {
        let n = self.left_children.len();
        if n == 0 {
            return Err("empty tree".into());
        }
        if [
            self.right_children.len(),
            self.split_indices.len(),
            self.split_conditions.len(),
            self.default_left.len(),
        ]
        .iter()
        .any(|len| *len != n)
        {
            return Err("node arrays differ in length".into());
        }
        if self.split_type.iter().any(|t| *t != 0) {
            return Err("categorical splits are not supported".into());
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (self.left_children[i], self.right_children[i]);
            let is_leaf = left == -1;
            // children are allocated after their parent
            let valid = |c: i32| c > i as i32 && (c as usize) < n;
            if !is_leaf && !(valid(left) && valid(right)) {
                return Err(format!("node {} has invalid children", i));
            }
            nodes.push(Node {
                left: left.max(0) as u32,
                right: right.max(0) as u32,
                feature: self.split_indices[i],
                value: self.split_conditions[i],
                default_left: self.default_left[i].is_set(),
                is_leaf,
            });
        }
        Ok(Tree { nodes })
    }
}
