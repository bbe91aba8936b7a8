mod align;
mod counter;
mod difference;
mod error;
mod pipeline;
mod raster;
mod regions;
mod score;
#[cfg(test)]
pub(crate) mod test_support;

pub use align::{Alignment, FrameAligner};
pub use counter::{ObjectCount, ToolCounter};
pub use difference::{
    AbsDiffStrategy, Difference, DifferenceStrategy, EdgeStrategy, SsimStrategy, Strategy,
};
pub use error::{AnalyticsError, Shape};
pub use pipeline::{compare, Artifacts, Comparison, Pipeline};
pub use raster::shape_of;
pub use regions::{Region, RegionExtractor, RegionKind, RegionReport};
pub use score::{Band, FusionInput, ScoreFusion, ScoreResult};
