pub mod fusion;
pub mod kitti;
pub mod record;
pub mod region;
