//! Resolution of transformed feature names for attribution display

use crate::models::pipeline::ClassifierPipeline;
use crate::preprocessor::FeatureOrigin;
use crate::types::transaction::TransactionField;
use tracing::{info, warn};

/// Where the resolved names came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// Mapping table persisted with the artifact
    Artifact,
    /// Introspection of the fitted preprocessor
    Preprocessor,
    /// Synthetic `feature_{i}` names
    Positional,
}

/// Transformed feature names with their originating fields.
#[derive(Debug, Clone)]
pub struct FeatureNames {
    origins: Vec<FeatureOrigin>,
    source: NameSource,
}

impl FeatureNames {
    /// Resolve names once at startup.
    ///
    /// `fallback_width` sizes the positional names when the forest does not
    /// report an input width either.
    pub fn resolve(pipeline: &ClassifierPipeline, fallback_width: usize) -> Self {
        let resolved = if let Some(map) = pipeline.feature_map.as_ref().filter(|m| !m.is_empty()) {
            Self {
                origins: map.clone(),
                source: NameSource::Artifact,
            }
        } else if let Some(origins) = pipeline.preprocessor.feature_names_out() {
            Self {
                origins,
                source: NameSource::Preprocessor,
            }
        } else {
            let width = match pipeline.forest.n_features() {
                0 => fallback_width,
                n => n,
            };
            warn!(width, "Preprocessor exposes no feature names, using positional names");
            Self::positional(width)
        };

        info!(
            source = ?resolved.source,
            count = resolved.len(),
            "Transformed feature names resolved"
        );
        resolved
    }

    /// Synthetic names with no known origin.
    pub fn positional(width: usize) -> Self {
        Self {
            origins: (0..width)
                .map(|i| FeatureOrigin {
                    name: format!("feature_{}", i),
                    field: None,
                })
                .collect(),
            source: NameSource::Positional,
        }
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn source(&self) -> NameSource {
        self.source
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.origins.get(index).map(|o| o.name.as_str())
    }

    /// Original field behind a transformed feature, if known.
    pub fn origin(&self, index: usize) -> Option<TransactionField> {
        self.origins.get(index).and_then(|o| o.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forest::{RandomForest, Tree};
    use crate::models::pipeline::ModelMetadata;
    use crate::preprocessor::Preprocessor;
    use uuid::Uuid;

    fn pipeline(n_features: usize, feature_map: Option<Vec<FeatureOrigin>>) -> ClassifierPipeline {
        let mut tree = Tree::new(2);
        tree.push_leaf(1.0, &[0.5, 0.5]);
        ClassifierPipeline {
            metadata: ModelMetadata {
                artifact_id: Uuid::nil(),
                model_version: "1.0.0".to_string(),
                trained_at: chrono::Utc::now(),
                seed: 0,
                n_training_rows: 0,
                roc_auc: 0.5,
            },
            preprocessor: Preprocessor::default(),
            forest: RandomForest::from_trees(n_features, vec![tree]),
            feature_map,
        }
    }

    #[test]
    fn test_artifact_table_wins() {
        let map = vec![FeatureOrigin {
            name: "cat__channel_PIX".to_string(),
            field: Some(TransactionField::Channel),
        }];
        let names = FeatureNames::resolve(&pipeline(1, Some(map)), 64);
        assert_eq!(names.source(), NameSource::Artifact);
        assert_eq!(names.origin(0), Some(TransactionField::Channel));
    }

    #[test]
    fn test_positional_fallback_uses_forest_width() {
        let names = FeatureNames::resolve(&pipeline(12, None), 64);
        assert_eq!(names.source(), NameSource::Positional);
        assert_eq!(names.len(), 12);
        assert_eq!(names.name(3), Some("feature_3"));
        assert_eq!(names.origin(3), None);
    }

    #[test]
    fn test_positional_fallback_default_width() {
        let names = FeatureNames::resolve(&pipeline(0, None), 64);
        assert_eq!(names.len(), 64);
    }
}
