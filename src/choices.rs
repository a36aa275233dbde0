//! Runtime wrappers exposing the built-in models via an enum while the
//! estimators stay generic over `dyn TransformModel`. The enum holds the
//! concrete variants plus a `Dyn` escape hatch for custom models.

use nalgebra::{Matrix3, Point2};

use crate::core::{Selection, TransformModel};
use crate::error::Result;
use crate::estimators::{FundamentalMatrixModel, HomographyModel, TranslationScaleModel};
use crate::normalization::{IsotropicNormalizer, Normalization, PointSetNormalizer};
use crate::settings::{EstimationSettings, ModelKind, NormalizationSettings, NormalizationType};
use crate::types::{Correspondences, Parameters};

/// Runtime model selection.
pub enum ModelChoice {
    Homography(HomographyModel),
    TranslationScale(TranslationScaleModel),
    FundamentalMatrix(FundamentalMatrixModel),
    Dyn(Box<dyn TransformModel>),
}

impl ModelChoice {
    fn inner(&self) -> &dyn TransformModel {
        match self {
            ModelChoice::Homography(m) => m,
            ModelChoice::TranslationScale(m) => m,
            ModelChoice::FundamentalMatrix(m) => m,
            ModelChoice::Dyn(m) => m.as_ref(),
        }
    }

    /// Built-in kind, `None` for custom models.
    pub fn kind(&self) -> Option<ModelKind> {
        match self {
            ModelChoice::Homography(_) => Some(ModelKind::Homography),
            ModelChoice::TranslationScale(_) => Some(ModelKind::TranslationScale),
            ModelChoice::FundamentalMatrix(_) => Some(ModelKind::FundamentalMatrix),
            ModelChoice::Dyn(_) => None,
        }
    }
}

impl std::fmt::Debug for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelChoice").field(&self.inner().name()).finish()
    }
}

impl TransformModel for ModelChoice {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn min_number_correspondences(&self) -> usize {
        self.inner().min_number_correspondences()
    }

    fn min_correspondence_dimension(&self) -> usize {
        self.inner().min_correspondence_dimension()
    }

    fn max_correspondence_dimension(&self) -> usize {
        self.inner().max_correspondence_dimension()
    }

    fn parameter_count(&self) -> usize {
        self.inner().parameter_count()
    }

    fn computes_squared_error(&self) -> bool {
        self.inner().computes_squared_error()
    }

    fn fit(&self, data: &Correspondences, selection: Selection<'_>) -> Result<Parameters> {
        self.inner().fit(data, selection)
    }

    fn residual_into(&self, data: &Correspondences, params: &[f64], out: &mut Vec<f64>) -> Result<()> {
        self.inner().residual_into(data, params, out)
    }

    fn denormalize(&self, params: &mut Parameters, first: &Normalization, second: &Normalization) -> Result<()> {
        self.inner().denormalize(params, first, second)
    }

    fn to_matrix(&self, params: &[f64]) -> Result<Matrix3<f64>> {
        self.inner().to_matrix(params)
    }

    fn evaluate(&self, point: &Point2<f64>, params: &[f64]) -> Option<Point2<f64>> {
        self.inner().evaluate(point, params)
    }
}

type ModelConstructor = fn(&EstimationSettings) -> ModelChoice;

fn homography(settings: &EstimationSettings) -> ModelChoice {
    ModelChoice::Homography(HomographyModel::with_settings(settings.transform))
}

fn translation_scale(settings: &EstimationSettings) -> ModelChoice {
    ModelChoice::TranslationScale(TranslationScaleModel::with_settings(settings.transform))
}

fn fundamental_matrix(settings: &EstimationSettings) -> ModelChoice {
    ModelChoice::FundamentalMatrix(FundamentalMatrixModel::with_settings(settings.fundamental))
}

const MODEL_TABLE: [(ModelKind, ModelConstructor); 3] = [
    (ModelKind::Homography, homography),
    (ModelKind::TranslationScale, translation_scale),
    (ModelKind::FundamentalMatrix, fundamental_matrix),
];

/// Model named by `settings.model`, configured from the matching settings block.
pub fn build_model(settings: &EstimationSettings) -> ModelChoice {
    let constructor = MODEL_TABLE
        .iter()
        .find(|(kind, _)| *kind == settings.model)
        .map_or(homography as ModelConstructor, |(_, c)| *c);
    constructor(settings)
}

/// Normalizer named by `settings.kind`, `None` when disabled.
pub fn build_normalizer(settings: &NormalizationSettings) -> Option<Box<dyn PointSetNormalizer>> {
    match settings.kind {
        NormalizationType::None => None,
        NormalizationType::Isotropic => Some(Box::new(IsotropicNormalizer::new(settings.average_distance))),
    }
}
