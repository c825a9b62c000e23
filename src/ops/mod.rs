pub mod adjustments;
pub mod brush;
pub mod filters;
pub mod focus;
pub mod frame;
pub mod noise;
pub mod overlays;
pub mod text;
pub mod transform;
