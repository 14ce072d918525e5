pub mod build_tool;
pub mod python;
