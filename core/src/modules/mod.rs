pub mod options;
pub mod sqlmap;
