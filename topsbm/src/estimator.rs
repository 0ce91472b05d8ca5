//! Estimator lifecycle shared by pipeline code: parameters, `fit`,
//! `transform`, and `fit_transform`.

/// An estimator with a replaceable parameter set.
pub trait Estimator {
    /// Hyper-parameters
    type Params: Clone;

    /// Current parameters
    fn params(&self) -> &Self::Params;

    /// Replace the parameters and discard any fitted state
    fn set_params(&mut self, params: Self::Params) -> &mut Self;

    /// Whether `fit` has completed
    fn is_fitted(&self) -> bool;
}

/// Learn model state from data `X`.
pub trait Fit<X: ?Sized> {
    /// Fit on `x`, samples in rows and features in columns
    fn fit(&mut self, x: &X) -> anyhow::Result<&mut Self>;
}

/// Map data `X` through a fitted model.
pub trait Transform<X: ?Sized> {
    /// Result of the transformation
    type Output;

    /// Transform `x`; errors if the model is not fitted
    fn transform(&self, x: &X) -> anyhow::Result<Self::Output>;
}

/// `fit` followed by `transform` on the same input.
pub trait FitTransform<X: ?Sized>: Fit<X> + Transform<X> {
    /// Fit on `x`, then transform `x`
    fn fit_transform(&mut self, x: &X) -> anyhow::Result<<Self as Transform<X>>::Output> {
        self.fit(x)?;
        self.transform(x)
    }
}

impl<X: ?Sized, T: Fit<X> + Transform<X>> FitTransform<X> for T {}
