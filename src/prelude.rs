pub use crate::runner::CoverageSource;
pub use crate::subpeaks::GaussianShape;
