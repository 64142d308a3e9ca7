mod sweeper;

pub use sweeper::*;
