//! Input/output: text traces, framed binary records, weight grids, station
//! tables, and the packed volume container.

pub mod framed;
pub mod station;
pub mod trace;
pub mod volume;
pub mod weight_grid;

pub use framed::{read_framed, write_framed};
pub use station::{write_cmtsolution, StationTable};
pub use trace::{read_column, Trace};
pub use volume::{read_volume, write_volume};
pub use weight_grid::WeightGrid;
