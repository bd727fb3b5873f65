//! Image collections and their block and series views.
//!
//! [`Images`] is the entry point. [`Blocks`] regroups its elements by spatial
//! region and [`Series`] turns them into one series per pixel.

pub mod blocks;
pub mod images;
pub mod readers;
pub mod series;

pub use blocks::{BlockPlan, BlockRegion, Blocks};
pub use images::Images;
pub use readers::{from_array, from_elements, from_partitioned};
pub use series::{Series, TimeSeries};
