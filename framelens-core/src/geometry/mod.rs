pub mod bbox;
pub mod polygon;
