pub mod consts;
pub mod error;
pub mod frame;
pub mod io;
pub mod ddm;
pub mod fit;
pub mod synth;
pub mod pipeline;
