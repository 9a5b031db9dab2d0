//! Per-prediction explanations: TreeSHAP in the transformed space and LIME
//! in the original space

pub mod feature_names;
pub mod lime;
pub mod shap;
pub mod tree_shap;

pub use feature_names::{FeatureNames, NameSource};
pub use lime::{LimeError, LimeExplainer, LimeSettings, LimeTabularExplainer};
pub use shap::{ShapExplainError, ShapExplainer};
pub use tree_shap::{AttributionVector, ShapError, ShapOutput, TreeExplainer};
