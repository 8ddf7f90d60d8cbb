pub mod data_pipeline;
pub mod stages;

pub use data_pipeline::{DataPipeline, StageFactory, StageRegistry, Transformer};
pub use stages::{Clean, Clip, Conversion, KeySelection, MovingAverage, Noise, OutlierRemove, UnitConvert};
