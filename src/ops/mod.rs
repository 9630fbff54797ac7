pub mod fade;
pub mod flood_fill;
